pub mod orders;
pub mod system;
