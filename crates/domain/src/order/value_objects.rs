//! Value objects for the order domain.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, Violation};

const FIELD: &str = "toppings";
const SEPARATOR: char = ',';

/// The set of items requested for an order.
///
/// Items are trimmed, de-duplicated and kept in ascending lexical order
/// (case-sensitive). A valid set holds at least one item and no item is blank.
/// Items may not contain `,` since the canonical text form is comma separated.
///
/// On the wire toppings are a JSON array of strings; in storage they are the
/// canonical text, e.g. `"Avocado, Rice, Zucchini"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Toppings(BTreeSet<String>);

impl Toppings {
    /// Builds a validated set of toppings.
    pub fn new<I, T>(items: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut violations = Vec::new();
        let mut has_blank = false;
        let mut has_separator = false;
        let mut set = BTreeSet::new();

        for item in items {
            let item: String = item.into();
            let trimmed = item.trim();
            if trimmed.is_empty() {
                has_blank = true;
                continue;
            }
            if trimmed.contains(SEPARATOR) {
                has_separator = true;
                continue;
            }
            set.insert(trimmed.to_string());
        }

        if has_blank {
            violations.push(Violation::new(FIELD, "Topping can not be blank"));
        }
        if has_separator {
            violations.push(Violation::new(FIELD, "Topping can not contain ','"));
        }
        if set.is_empty() && violations.is_empty() {
            violations.push(Violation::new(FIELD, "Toppings are required"));
        }

        if violations.is_empty() {
            Ok(Self(set))
        } else {
            Err(ValidationError::new(violations))
        }
    }

    /// Parses the canonical text form: comma separated, whitespace trimmed.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        Self::new(text.split(SEPARATOR))
    }

    /// Returns the canonical text form: sorted items joined by `", "`.
    pub fn canonical_text(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }

    /// Iterates over the items in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of distinct items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed value; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the given item is part of the set.
    pub fn contains(&self, item: &str) -> bool {
        self.0.contains(item)
    }
}

impl std::fmt::Display for Toppings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_text())
    }
}

impl std::str::FromStr for Toppings {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<Vec<String>> for Toppings {
    type Error = ValidationError;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl From<Toppings> for Vec<String> {
    fn from(toppings: Toppings) -> Self {
        toppings.0.into_iter().collect()
    }
}
