use sqlx::PgPool;
use std::collections::HashSet;

use crate::{error::AppResult, services::providers::DietaryProfile};

/// Dietary flags from the Postgres `customers` table
#[derive(Clone)]
pub struct PgDietaryProfile {
    pool: PgPool,
}

impl PgDietaryProfile {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DietaryProfile for PgDietaryProfile {
    async fn is_vegetarian(&self, customer_id: i64) -> AppResult<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT vegetarian FROM customers WHERE id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(flag.unwrap_or(false))
    }
}

/// Fixed set of vegetarian customers
#[derive(Debug, Clone, Default)]
pub struct StaticDietaryProfile {
    vegetarians: HashSet<i64>,
}

impl StaticDietaryProfile {
    pub fn new(vegetarians: impl IntoIterator<Item = i64>) -> Self {
        Self {
            vegetarians: vegetarians.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl DietaryProfile for StaticDietaryProfile {
    async fn is_vegetarian(&self, customer_id: i64) -> AppResult<bool> {
        Ok(self.vegetarians.contains(&customer_id))
    }
}
