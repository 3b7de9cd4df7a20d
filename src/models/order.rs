use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// A historical pizza order
///
/// Orders are append-only facts owned by the order store; this crate only
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub customer_id: i64,
    pub dish: String,
    /// Comma-separated ingredient list as recorded with the order
    pub ingredients: String,
    pub ordered_at: NaiveDateTime,
    #[serde(default)]
    pub price: Option<f64>,
    /// Weather at order time, when the order store recorded it
    #[serde(default)]
    pub cold_weather: Option<bool>,
}

impl Order {
    pub fn new(
        customer_id: i64,
        dish: impl Into<String>,
        ingredients: impl Into<String>,
        ordered_at: NaiveDateTime,
    ) -> Self {
        Self {
            customer_id,
            dish: dish.into(),
            ingredients: ingredients.into(),
            ordered_at,
            price: None,
            cold_weather: None,
        }
    }

    pub fn hour(&self) -> u32 {
        self.ordered_at.hour()
    }

    pub fn weekday(&self) -> Weekday {
        self.ordered_at.weekday()
    }
}
