//! Feature construction shared by training and inference
//!
//! A record is first built as named columns, scaled, then reindexed to the
//! column list persisted with the model. Reindexing fills columns missing
//! from the record with 0.0 and drops columns the model does not know, so a
//! record always has exactly the persisted schema in the persisted order.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashMap;
use thiserror::Error;

use crate::{
    ml::TfidfVectorizer,
    models::{MenuEntry, Order},
    services::{
        keyword_rules::{DishFlag, KeywordRules},
        model_store::ModelBundle,
    },
};

pub const CUSTOMER_COLUMN: &str = "customer_id_encoded";
pub const HOUR_COLUMN: &str = "hour";
pub const WEEKDAY_COLUMN: &str = "weekday";
pub const MONTH_COLUMN: &str = "month";
pub const PRICE_COLUMN: &str = "price";
pub const COLD_WEATHER_COLUMN: &str = "is_cold_weather";

/// Columns standardized by the fitted scaler
pub const SCALED_COLUMNS: [&str; 4] = [HOUR_COLUMN, WEEKDAY_COLUMN, MONTH_COLUMN, PRICE_COLUMN];

/// Encoding for customers absent from the training data
pub const UNSEEN_CUSTOMER: f64 = -1.0;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("feature artifacts are not fitted; train or load a model first")]
    NotFitted,

    #[error("column {column} has non-finite value {value}")]
    InvalidValue { column: String, value: f64 },

    #[error("cannot scale record: {0}")]
    Scaling(String),
}

pub fn ingredient_column(index: usize) -> String {
    format!("ingredient_{index}")
}

/// Full training schema for a vocabulary of the given size
pub fn feature_columns(vocabulary_len: usize) -> Vec<String> {
    let mut columns: Vec<String> = [
        CUSTOMER_COLUMN,
        HOUR_COLUMN,
        WEEKDAY_COLUMN,
        MONTH_COLUMN,
        PRICE_COLUMN,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    columns.extend(DishFlag::ALL.iter().map(|flag| flag.column().to_string()));
    columns.push(COLD_WEATHER_COLUMN.to_string());
    columns.extend((0..vocabulary_len).map(ingredient_column));
    columns
}

/// When and under which weather a dish would be ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureContext {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u32,
    pub month: u32,
    pub is_cold: bool,
}

impl FeatureContext {
    pub fn at(datetime: NaiveDateTime, is_cold: bool) -> Self {
        Self {
            hour: datetime.hour(),
            weekday: datetime.weekday().num_days_from_monday(),
            month: datetime.month(),
            is_cold,
        }
    }
}

/// The dish a record describes
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub dish: &'a str,
    pub ingredients: &'a str,
    pub price: f64,
}

impl<'a> From<&'a MenuEntry> for Candidate<'a> {
    fn from(entry: &'a MenuEntry) -> Self {
        Self {
            dish: &entry.name,
            ingredients: &entry.ingredients,
            price: entry.price,
        }
    }
}

impl<'a> Candidate<'a> {
    /// Candidate for a historical order, pricing from the order or else the menu
    pub fn from_order(order: &'a Order, menu_price: Option<f64>) -> Self {
        Self {
            dish: &order.dish,
            ingredients: &order.ingredients,
            price: order.price.or(menu_price).unwrap_or(0.0),
        }
    }
}

fn indicator(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Named, unscaled record for one candidate
pub(crate) fn raw_record(
    customer_encoded: f64,
    context: &FeatureContext,
    candidate: &Candidate<'_>,
    rules: &KeywordRules,
    vectorizer: &TfidfVectorizer,
) -> Result<Vec<(String, f64)>, FeatureError> {
    if !candidate.price.is_finite() {
        return Err(FeatureError::InvalidValue {
            column: PRICE_COLUMN.to_string(),
            value: candidate.price,
        });
    }

    let flags = rules.evaluate(candidate.dish, candidate.ingredients);
    let tfidf = vectorizer.transform(&candidate.ingredients.to_lowercase());

    let mut record = Vec::with_capacity(9 + tfidf.len());
    record.push((CUSTOMER_COLUMN.to_string(), customer_encoded));
    record.push((HOUR_COLUMN.to_string(), context.hour as f64));
    record.push((WEEKDAY_COLUMN.to_string(), context.weekday as f64));
    record.push((MONTH_COLUMN.to_string(), context.month as f64));
    record.push((PRICE_COLUMN.to_string(), candidate.price));
    for flag in DishFlag::ALL {
        record.push((flag.column().to_string(), indicator(flags.get(flag))));
    }
    record.push((COLD_WEATHER_COLUMN.to_string(), indicator(context.is_cold)));
    record.extend(
        tfidf
            .into_iter()
            .enumerate()
            .map(|(i, v)| (ingredient_column(i), v)),
    );

    Ok(record)
}

/// Projects a named record onto `schema` (missing → 0.0, extra → dropped)
pub fn reindex(record: &[(String, f64)], schema: &[String]) -> Vec<f64> {
    let values: HashMap<&str, f64> = record.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    schema
        .iter()
        .map(|column| values.get(column.as_str()).copied().unwrap_or(0.0))
        .collect()
}

/// Builds inference rows from a fitted artifact bundle
pub struct FeatureBuilder<'a> {
    artifacts: Option<&'a ModelBundle>,
    rules: &'a KeywordRules,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(artifacts: Option<&'a ModelBundle>, rules: &'a KeywordRules) -> Self {
        Self { artifacts, rules }
    }

    fn artifacts(&self) -> Result<&'a ModelBundle, FeatureError> {
        self.artifacts.ok_or_else(|| {
            tracing::warn!("Feature builder called without fitted vectorizer/encoders");
            FeatureError::NotFitted
        })
    }

    /// Customer label, or `UNSEEN_CUSTOMER` for customers the model never saw
    pub fn encode_customer(&self, customer_id: i64) -> Result<f64, FeatureError> {
        let bundle = self.artifacts()?;
        Ok(bundle
            .customer_encoder
            .transform(&customer_id)
            .map_or(UNSEEN_CUSTOMER, |idx| idx as f64))
    }

    /// Feature row for `customer_id` ordering `candidate` in `context`
    pub fn build(
        &self,
        customer_id: i64,
        context: &FeatureContext,
        candidate: &Candidate<'_>,
    ) -> Result<Vec<f64>, FeatureError> {
        let bundle = self.artifacts()?;
        let customer_encoded = self.encode_customer(customer_id)?;

        let mut record = raw_record(
            customer_encoded,
            context,
            candidate,
            self.rules,
            &bundle.vectorizer,
        )?;
        bundle
            .scaler
            .transform_record(&mut record)
            .map_err(|e| FeatureError::Scaling(e.to_string()))?;

        Ok(reindex(&record, &bundle.feature_columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_feature_columns_order() {
        let columns = feature_columns(2);
        assert_eq!(columns.len(), 11);
        assert_eq!(columns[0], CUSTOMER_COLUMN);
        assert_eq!(&columns[5..8], ["is_vegetarian", "is_spicy", "is_sweet"]);
        assert_eq!(columns[8], COLD_WEATHER_COLUMN);
        assert_eq!(columns[9], "ingredient_0");
        assert_eq!(columns[10], "ingredient_1");
    }

    #[test]
    fn test_context_from_datetime() {
        // 2024-06-16 is a Sunday
        let at = NaiveDate::from_ymd_opt(2024, 6, 16)
            .unwrap()
            .and_hms_opt(20, 15, 0)
            .unwrap();
        let context = FeatureContext::at(at, true);

        assert_eq!(context.hour, 20);
        assert_eq!(context.weekday, 6);
        assert_eq!(context.month, 6);
        assert!(context.is_cold);
    }

    #[test]
    fn test_reindex_fills_missing_and_drops_extra() {
        let record = vec![
            ("hour".to_string(), 19.0),
            ("unexpected".to_string(), 99.0),
            ("price".to_string(), 45.0),
        ];
        let schema = vec!["price".to_string(), "month".to_string(), "hour".to_string()];

        assert_eq!(reindex(&record, &schema), vec![45.0, 0.0, 19.0]);
    }

    #[test]
    fn test_raw_record_flags_and_tfidf() {
        let vectorizer = TfidfVectorizer::fit(&["tomato, pepperoni", "basil"]).unwrap();
        let context = FeatureContext {
            hour: 19,
            weekday: 4,
            month: 6,
            is_cold: true,
        };
        let candidate = Candidate {
            dish: "Pepperoni",
            ingredients: "Tomato, Pepperoni",
            price: 48.0,
        };

        let record =
            raw_record(3.0, &context, &candidate, &KeywordRules::default(), &vectorizer).unwrap();
        let get = |name: &str| record.iter().find(|(k, _)| k == name).unwrap().1;

        assert_eq!(record.len(), feature_columns(vectorizer.vocabulary_len()).len());
        assert_eq!(get(CUSTOMER_COLUMN), 3.0);
        assert_eq!(get("is_spicy"), 1.0);
        assert_eq!(get("is_vegetarian"), 1.0);
        assert_eq!(get("is_sweet"), 0.0);
        assert_eq!(get(COLD_WEATHER_COLUMN), 1.0);
        // vocabulary: basil, pepperoni, tomato
        assert_eq!(get("ingredient_0"), 0.0);
        assert!(get("ingredient_1") > 0.0);
    }

    #[test]
    fn test_raw_record_rejects_non_finite_price() {
        let vectorizer = TfidfVectorizer::fit(&["tomato"]).unwrap();
        let context = FeatureContext {
            hour: 12,
            weekday: 0,
            month: 1,
            is_cold: false,
        };
        let candidate = Candidate {
            dish: "Broken",
            ingredients: "tomato",
            price: f64::NAN,
        };

        let err = raw_record(0.0, &context, &candidate, &KeywordRules::default(), &vectorizer)
            .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidValue { ref column, .. } if column == "price"));
    }

    #[test]
    fn test_builder_without_artifacts_is_not_fitted() {
        let rules = KeywordRules::default();
        let builder = FeatureBuilder::new(None, &rules);
        let context = FeatureContext {
            hour: 12,
            weekday: 0,
            month: 1,
            is_cold: false,
        };
        let candidate = Candidate {
            dish: "Margherita",
            ingredients: "tomato",
            price: 40.0,
        };

        assert_eq!(
            builder.build(1, &context, &candidate),
            Err(FeatureError::NotFitted)
        );
    }
}
