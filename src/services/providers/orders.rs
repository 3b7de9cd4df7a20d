use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::{error::AppResult, models::Order, services::providers::OrderHistory};

/// Orders stored in the Postgres `orders` table
#[derive(Clone)]
pub struct PgOrderHistory {
    pool: PgPool,
}

impl PgOrderHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderHistory for PgOrderHistory {
    async fn all_orders(&self) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT customer_id, dish, ingredients, ordered_at, price, cold_weather
            FROM orders
            ORDER BY ordered_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = orders.len(), "Loaded order history");
        Ok(orders)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Process-local order list
#[derive(Default)]
pub struct InMemoryOrderHistory {
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderHistory {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: RwLock::new(orders),
        }
    }

    pub async fn record(&self, order: Order) {
        self.orders.write().await.push(order);
    }
}

#[async_trait::async_trait]
impl OrderHistory for InMemoryOrderHistory {
    async fn all_orders(&self) -> AppResult<Vec<Order>> {
        let mut orders = self.orders.read().await.clone();
        orders.sort_by_key(|o| o.ordered_at);
        Ok(orders)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_history_returns_oldest_first() {
        let history = InMemoryOrderHistory::new(vec![Order::new(1, "Pepperoni", "pepperoni", at(5))]);
        history
            .record(Order::new(2, "Margherita", "tomato", at(3)))
            .await;

        let orders = tokio_test::assert_ok!(history.all_orders().await);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].dish, "Margherita");
        assert_eq!(history.name(), "memory");
    }
}
