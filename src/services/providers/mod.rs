//! Collaborators the recommender reads from
//!
//! Each concern sits behind a small async trait so the recommender can run
//! against Postgres/HTTP in production and against in-memory data in tests.

use crate::{error::AppResult, models::Order};

pub mod dietary;
pub mod orders;
pub mod weather;

pub use dietary::{PgDietaryProfile, StaticDietaryProfile};
pub use orders::{InMemoryOrderHistory, PgOrderHistory};
pub use weather::{FixedWeather, OpenMeteoWeather};

/// Read access to the append-only order store
#[async_trait::async_trait]
pub trait OrderHistory: Send + Sync {
    /// Every recorded order, oldest first
    async fn all_orders(&self) -> AppResult<Vec<Order>>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Current weather, reduced to the one signal the recommender uses
#[async_trait::async_trait]
pub trait WeatherStatus: Send + Sync {
    async fn is_cold_now(&self) -> AppResult<bool>;
}

/// Dietary flags recorded per customer
#[async_trait::async_trait]
pub trait DietaryProfile: Send + Sync {
    /// `false` for customers without a profile
    async fn is_vegetarian(&self, customer_id: i64) -> AppResult<bool>;
}
