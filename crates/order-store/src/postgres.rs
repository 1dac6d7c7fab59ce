use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::timestamp_now;
use domain::{Order, OrderStatus, Toppings};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::{OrderId, Result, StoreError, store::OrderStore};

const SELECT_ORDER: &str = r#"
    SELECT id, toppings, status, created_at, updated_at, version, failure_reason
    FROM "order".orders
"#;

/// PostgreSQL-backed order store implementation.
///
/// Toppings are stored in their canonical text form. Optimistic concurrency
/// and the conditional status update are both expressed as guarded `UPDATE`
/// statements, so the database serializes competing writers.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and wraps it in a store.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id: String = row.try_get("id")?;
        let toppings_text: String = row.try_get("toppings")?;
        let status_text: String = row.try_get("status")?;

        let toppings = Toppings::parse(&toppings_text).map_err(|e| StoreError::Corrupt {
            order_id: id.clone(),
            reason: e.to_string(),
        })?;
        let status: OrderStatus = status_text.parse().map_err(|e: domain::UnknownStatus| {
            StoreError::Corrupt {
                order_id: id.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Order::restore(
            OrderId::from(id),
            toppings,
            status,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
            row.try_get("version")?,
            row.try_get("failure_reason")?,
        ))
    }

    async fn current_version(&self, id: &OrderId) -> Result<Option<i64>> {
        let version = sqlx::query_scalar(r#"SELECT version FROM "order".orders WHERE id = $1"#)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    async fn insert(&self, mut order: Order) -> Result<Order> {
        order.record_write(timestamp_now());

        let result = sqlx::query(
            r#"
            INSERT INTO "order".orders (id, toppings, status, created_at, updated_at, version, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id().as_str())
        .bind(order.toppings().canonical_text())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(order.version())
        .bind(order.failure_reason())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            metrics::counter!("order_store_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id().clone(),
                expected: 0,
                actual: self.current_version(order.id()).await?,
            });
        }

        Ok(order)
    }

    async fn update(&self, mut order: Order) -> Result<Order> {
        let expected = order.version();
        order.record_write(timestamp_now());

        let result = sqlx::query(
            r#"
            UPDATE "order".orders
            SET status = $2, failure_reason = $3, updated_at = $4, version = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(order.id().as_str())
        .bind(order.status().as_str())
        .bind(order.failure_reason())
        .bind(order.updated_at())
        .bind(order.version())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.current_version(order.id()).await? {
                None => Err(StoreError::NotFound(order.id().clone())),
                actual => {
                    metrics::counter!("order_store_conflicts_total").increment(1);
                    Err(StoreError::ConcurrencyConflict {
                        order_id: order.id().clone(),
                        expected,
                        actual,
                    })
                }
            };
        }

        Ok(order)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn save(&self, order: Order) -> Result<Order> {
        if order.version() == 0 {
            self.insert(order).await
        } else {
            self.update(order).await
        }
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!("{SELECT_ORDER} ORDER BY created_at ASC, id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn compare_and_set_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        failure_reason: Option<String>,
    ) -> Result<bool> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }

        let failure_reason = match next {
            OrderStatus::Failed => failure_reason,
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE "order".orders
            SET status = $3, failure_reason = $4, updated_at = $5, version = version + 1
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(failure_reason)
        .bind(timestamp_now())
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() == 1;
        tracing::debug!(order_id = %id, %expected, %next, changed, "conditional status update");
        Ok(changed)
    }
}
