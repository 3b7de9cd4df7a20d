//! Heuristic recommendations computed straight from order history
//!
//! Used whenever the model cannot answer. The cascade is: customers with a
//! similar ingredient profile ordering in the current context window, then the
//! customer's own favourite, then what is popular right now, then the house
//! default. The pick is then adjusted for vegetarian customers and for cold
//! weather.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error;

use crate::{
    ml::{cosine_similarity, TfidfVectorizer},
    models::{split_ingredients, MenuCatalog, Order, Recommendation, RecommendationSource},
    services::keyword_rules::contains_any,
};

pub const EMPTY_HISTORY_RATIONALE: &str = "No orders recorded yet. Here's our special suggestion!";
pub const DEFAULT_RATIONALE: &str = "Our special suggestion!";
pub const VEGETARIAN_RATIONALE: &str = "Recommendation adapted to your vegetarian profile.";
pub const COLD_WEATHER_SUFFIX: &str = " And it's cold out! We suggest something warm.";
const SIMILAR_CUSTOMERS_RATIONALE: &str = "Customers with tastes like yours ordered this!";

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("no ingredients known for dish {0}")]
    MissingIngredients(String),

    #[error("failed to load order history: {0}")]
    History(String),

    #[error("failed to look up dietary profile: {0}")]
    Dietary(String),
}

/// Tunables of the heuristic cascade
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    /// Hours either side of the current hour counted as "now"
    pub context_hour_window: u32,
    pub similar_customers: usize,
    /// Lower-cased; an order containing any of these is not vegetarian
    pub meat_keywords: Vec<String>,
    pub hot_dishes: BTreeSet<String>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            context_hour_window: 2,
            similar_customers: 3,
            meat_keywords: ["pepperoni", "calabrese", "chicken", "ham", "bacon", "beef", "sausage"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            hot_dishes: ["Calabrese", "Pepperoni", "Chicken with Catupiry", "Four Cheese"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Everything the cascade needs besides the history itself
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest {
    pub customer_id: Option<i64>,
    pub now: NaiveDateTime,
    pub is_vegetarian: bool,
    pub is_cold: bool,
}

/// Selected dish before it is turned into a `Recommendation`
struct Pick {
    dish: String,
    rationale: String,
}

impl Pick {
    fn new(dish: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            dish: dish.into(),
            rationale: rationale.into(),
        }
    }
}

/// Most frequent dish; ties go to the lexicographically smallest name
fn most_frequent<'a, I>(orders: I) -> Option<(&'a str, usize)>
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for order in orders {
        *counts.entry(order.dish.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (dish, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((dish, count));
        }
    }
    best
}

pub struct FallbackEngine {
    menu: Arc<MenuCatalog>,
    policy: FallbackPolicy,
}

impl FallbackEngine {
    pub fn new(menu: Arc<MenuCatalog>, policy: FallbackPolicy) -> Self {
        Self { menu, policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn recommend(
        &self,
        orders: &[Order],
        request: &FallbackRequest,
    ) -> Result<Recommendation, FallbackError> {
        if orders.is_empty() {
            tracing::info!("No order history; recommending the house default");
            let default = self.menu.first();
            return self.finish(orders, Pick::new(&default.name, EMPTY_HISTORY_RATIONALE));
        }

        let mut pick = self.select(orders, request);

        let pool: Vec<&Order> = if request.is_vegetarian {
            let pool: Vec<&Order> = orders
                .iter()
                .filter(|o| !contains_any(&o.ingredients, &self.policy.meat_keywords))
                .collect();

            let pick_in_pool = pool.iter().any(|o| o.dish == pick.dish);
            if !pick_in_pool {
                if let Some((dish, _)) = most_frequent(pool.iter().copied()) {
                    tracing::debug!(from = %pick.dish, to = dish, "Vegetarian substitution");
                    pick = Pick::new(dish, VEGETARIAN_RATIONALE);
                }
            }
            pool
        } else {
            orders.iter().collect()
        };

        if request.is_cold && !self.policy.hot_dishes.contains(&pick.dish) {
            let hot = pool
                .iter()
                .copied()
                .filter(|o| self.policy.hot_dishes.contains(&o.dish));
            if let Some((dish, _)) = most_frequent(hot) {
                tracing::debug!(from = %pick.dish, to = dish, "Cold weather substitution");
                pick.dish = dish.to_string();
                pick.rationale.push_str(COLD_WEATHER_SUFFIX);
            }
        }

        self.finish(orders, pick)
    }

    /// Selection cascade before dietary and weather adjustments
    fn select(&self, orders: &[Order], request: &FallbackRequest) -> Pick {
        let in_context: Vec<&Order> = orders
            .iter()
            .filter(|o| self.in_context_window(o, &request.now))
            .collect();

        let own_history: Vec<&Order> = match request.customer_id {
            Some(id) => orders.iter().filter(|o| o.customer_id == id).collect(),
            None => Vec::new(),
        };

        if let Some(customer_id) = request.customer_id.filter(|_| !own_history.is_empty()) {
            let similar = self.similar_customers(customer_id, orders);

            if similar.is_empty() {
                if let Some((dish, count)) = most_frequent(own_history.iter().copied()) {
                    return Pick::new(dish, format!("You always order this one! ({count}x)"));
                }
            } else {
                let from_similar = in_context
                    .iter()
                    .copied()
                    .filter(|o| similar.contains(&o.customer_id));
                if let Some((dish, _)) = most_frequent(from_similar) {
                    return Pick::new(dish, SIMILAR_CUSTOMERS_RATIONALE);
                }
                if let Some((dish, count)) = most_frequent(own_history.iter().copied()) {
                    return Pick::new(
                        dish,
                        format!("Based on your history. You've ordered this {count}x!"),
                    );
                }
            }
        }

        if let Some((dish, _)) = most_frequent(in_context.iter().copied()) {
            return Pick::new(
                dish,
                format!("Popular today ({}) at this time!", request.now.format("%A")),
            );
        }

        Pick::new(&self.menu.first().name, DEFAULT_RATIONALE)
    }

    fn in_context_window(&self, order: &Order, now: &NaiveDateTime) -> bool {
        let hour = now.hour();
        let low = hour.saturating_sub(self.policy.context_hour_window);
        let high = (hour + self.policy.context_hour_window).min(23);

        order.weekday() == now.weekday() && (low..=high).contains(&order.hour())
    }

    /// Other customers whose pooled ingredient profile is closest to `customer_id`'s
    ///
    /// Every other customer is a candidate, zero similarity included; the list
    /// is ordered by similarity then by id and capped at `similar_customers`.
    pub fn similar_customers(&self, customer_id: i64, orders: &[Order]) -> Vec<i64> {
        let mut profiles: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
        for order in orders {
            profiles
                .entry(order.customer_id)
                .or_default()
                .push(&order.ingredients);
        }

        if !profiles.contains_key(&customer_id) {
            return Vec::new();
        }

        let ids: Vec<i64> = profiles.keys().copied().collect();
        let documents: Vec<String> = profiles
            .values()
            .map(|parts| parts.join(" ").to_lowercase())
            .collect();

        let Some((_, vectors)) = TfidfVectorizer::fit_transform(&documents) else {
            tracing::debug!("Ingredient profiles have no vocabulary; skipping similarity");
            return Vec::new();
        };

        let Some(target) = ids.iter().position(|&id| id == customer_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(i64, f64)> = ids
            .iter()
            .zip(&vectors)
            .filter(|(id, _)| **id != customer_id)
            .map(|(&id, vector)| (id, cosine_similarity(&vectors[target], vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.policy.similar_customers);

        tracing::debug!(customer_id, similar = ?scored, "Similar customers");
        scored.into_iter().map(|(id, _)| id).collect()
    }

    fn finish(&self, orders: &[Order], pick: Pick) -> Result<Recommendation, FallbackError> {
        let ingredients = match self.menu.get(&pick.dish) {
            Some(entry) => entry.ingredient_list(),
            None => orders
                .iter()
                .filter(|o| o.dish == pick.dish)
                .max_by_key(|o| o.ordered_at)
                .map(|o| split_ingredients(&o.ingredients))
                .ok_or_else(|| FallbackError::MissingIngredients(pick.dish.clone()))?,
        };

        tracing::info!(dish = %pick.dish, rationale = %pick.rationale, "Fallback recommendation");

        Ok(Recommendation {
            recommended_dish: pick.dish,
            ingredients,
            rationale: pick.rationale,
            source: RecommendationSource::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::menu::fixtures::sample_menu;
    use crate::services::fixtures::{at, order};

    fn engine() -> FallbackEngine {
        FallbackEngine::new(Arc::new(sample_menu()), FallbackPolicy::default())
    }

    fn request(customer_id: Option<i64>, now: NaiveDateTime) -> FallbackRequest {
        FallbackRequest {
            customer_id,
            now,
            is_vegetarian: false,
            is_cold: false,
        }
    }

    #[test]
    fn test_empty_history_returns_first_menu_entry() {
        let engine = engine();
        let mut req = request(Some(7), at(3, 19));
        req.is_vegetarian = true;
        req.is_cold = true;

        let rec = engine.recommend(&[], &req).unwrap();
        assert_eq!(rec.recommended_dish, "Margherita");
        assert_eq!(rec.rationale, EMPTY_HISTORY_RATIONALE);
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(rec.ingredients, vec!["tomato sauce", "mozzarella", "basil", "tomato"]);
    }

    #[test]
    fn test_own_history_without_similar_customers_cites_count() {
        let menu = sample_menu();
        let orders: Vec<Order> = (0..5).map(|i| order(&menu, 42, "Pepperoni", 3, 12 + i)).collect();

        // Sunday evening: nothing in the context window
        let rec = engine().recommend(&orders, &request(Some(42), at(9, 21))).unwrap();
        assert_eq!(rec.recommended_dish, "Pepperoni");
        assert_eq!(rec.rationale, "You always order this one! (5x)");
        assert_eq!(rec.ingredients, vec!["tomato sauce", "mozzarella", "pepperoni"]);
    }

    #[test]
    fn test_similar_customers_in_context_window() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Pepperoni", 3, 10),
            order(&menu, 2, "Calabrese", 3, 19),
            order(&menu, 2, "Calabrese", 3, 20),
            // outside the window
            order(&menu, 2, "Pepperoni", 3, 12),
        ];

        let rec = engine().recommend(&orders, &request(Some(1), at(3, 19))).unwrap();
        assert_eq!(rec.recommended_dish, "Calabrese");
        assert_eq!(rec.rationale, SIMILAR_CUSTOMERS_RATIONALE);
    }

    #[test]
    fn test_similar_customers_outside_window_use_own_history() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Pepperoni", 3, 10),
            order(&menu, 1, "Pepperoni", 4, 10),
            order(&menu, 1, "Calabrese", 4, 11),
            order(&menu, 2, "Calabrese", 5, 19),
        ];

        let rec = engine().recommend(&orders, &request(Some(1), at(3, 19))).unwrap();
        assert_eq!(rec.recommended_dish, "Pepperoni");
        assert_eq!(rec.rationale, "Based on your history. You've ordered this 2x!");
    }

    #[test]
    fn test_new_customer_skips_similarity_and_gets_popular_dish() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Four Cheese", 3, 18),
            order(&menu, 2, "Four Cheese", 3, 20),
            order(&menu, 3, "Chocolate", 3, 21),
            order(&menu, 3, "Chocolate", 4, 19),
        ];

        let engine = engine();
        assert!(engine.similar_customers(99, &orders).is_empty());

        let rec = engine.recommend(&orders, &request(Some(99), at(3, 19))).unwrap();
        assert_eq!(rec.recommended_dish, "Four Cheese");
        assert_eq!(rec.rationale, "Popular today (Monday) at this time!");
    }

    #[test]
    fn test_no_context_orders_returns_default() {
        let menu = sample_menu();
        let orders = vec![order(&menu, 1, "Four Cheese", 4, 12)];

        let rec = engine().recommend(&orders, &request(None, at(3, 19))).unwrap();
        assert_eq!(rec.recommended_dish, "Margherita");
        assert_eq!(rec.rationale, DEFAULT_RATIONALE);
    }

    #[test]
    fn test_context_window_is_clamped_at_midnight() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Chocolate", 3, 1),
            order(&menu, 1, "Four Cheese", 3, 3),
        ];

        let rec = engine().recommend(&orders, &request(None, at(3, 0))).unwrap();
        assert_eq!(rec.recommended_dish, "Chocolate");
    }

    #[test]
    fn test_frequency_ties_break_by_name() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Pepperoni", 3, 19),
            order(&menu, 1, "Calabrese", 3, 19),
        ];

        let rec = engine().recommend(&orders, &request(Some(1), at(9, 12))).unwrap();
        assert_eq!(rec.recommended_dish, "Calabrese");
    }

    #[test]
    fn test_similarity_excludes_self_and_orders_by_score() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Pepperoni", 3, 19),
            order(&menu, 2, "Pepperoni", 3, 19),
            order(&menu, 3, "Margherita", 3, 19),
            order(&menu, 4, "Chocolate", 3, 19),
        ];

        let similar = engine().similar_customers(1, &orders);
        assert_eq!(similar, vec![2, 3, 4]);
    }

    #[test]
    fn test_similar_customers_capped_at_policy_size() {
        let menu = sample_menu();
        let orders: Vec<Order> = (1..=6)
            .map(|id| order(&menu, id, "Margherita", 3, 19))
            .collect();

        let similar = engine().similar_customers(1, &orders);
        assert_eq!(similar, vec![2, 3, 4]);
    }

    #[test]
    fn test_unrelated_neighbour_in_context_window_still_counts() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Pepperoni", 4, 10),
            order(&menu, 1, "Pepperoni", 5, 10),
            // no ingredient term in common with customer 1
            order(&menu, 2, "Chocolate", 3, 19),
        ];

        let engine = engine();
        assert_eq!(engine.similar_customers(1, &orders), vec![2]);

        let rec = engine.recommend(&orders, &request(Some(1), at(3, 19))).unwrap();
        assert_eq!(rec.recommended_dish, "Chocolate");
        assert_eq!(rec.rationale, SIMILAR_CUSTOMERS_RATIONALE);
    }

    #[test]
    fn test_vegetarian_customer_never_gets_meat() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 5, "Pepperoni", 3, 19),
            order(&menu, 5, "Pepperoni", 4, 19),
            order(&menu, 6, "Margherita", 5, 12),
            order(&menu, 6, "Vegetarian", 6, 12),
            order(&menu, 7, "Vegetarian", 6, 13),
        ];
        let mut req = request(Some(5), at(9, 21));
        req.is_vegetarian = true;

        let engine = engine();
        let rec = engine.recommend(&orders, &req).unwrap();
        assert_eq!(rec.recommended_dish, "Vegetarian");
        assert_eq!(rec.rationale, VEGETARIAN_RATIONALE);
        let ingredients = rec.ingredients.join(", ");
        assert!(!contains_any(&ingredients, &engine.policy().meat_keywords));
    }

    #[test]
    fn test_vegetarian_with_only_meat_orders_keeps_pick() {
        let menu = sample_menu();
        let orders = vec![order(&menu, 5, "Pepperoni", 3, 19)];
        let mut req = request(Some(5), at(9, 21));
        req.is_vegetarian = true;

        let rec = engine().recommend(&orders, &req).unwrap();
        assert_eq!(rec.recommended_dish, "Pepperoni");
        assert_eq!(rec.rationale, "You always order this one! (1x)");
    }

    #[test]
    fn test_cold_weather_switches_to_hot_dish() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Chocolate", 3, 19),
            order(&menu, 1, "Chocolate", 4, 19),
            order(&menu, 2, "Four Cheese", 5, 12),
        ];
        let mut req = request(Some(1), at(9, 21));
        req.is_cold = true;

        let engine = engine();
        let rec = engine.recommend(&orders, &req).unwrap();
        assert!(engine.policy().hot_dishes.contains(&rec.recommended_dish));
        assert_eq!(rec.recommended_dish, "Four Cheese");
        assert!(rec.rationale.ends_with(COLD_WEATHER_SUFFIX));
    }

    #[test]
    fn test_cold_weather_respects_vegetarian_pool() {
        let menu = sample_menu();
        let orders = vec![
            order(&menu, 1, "Margherita", 3, 19),
            order(&menu, 2, "Pepperoni", 3, 19),
            order(&menu, 2, "Four Cheese", 4, 19),
        ];
        let mut req = request(Some(1), at(9, 21));
        req.is_vegetarian = true;
        req.is_cold = true;

        let rec = engine().recommend(&orders, &req).unwrap();
        assert_eq!(rec.recommended_dish, "Four Cheese");
    }

    #[test]
    fn test_cold_weather_without_hot_dishes_keeps_pick() {
        let menu = sample_menu();
        let orders = vec![order(&menu, 1, "Chocolate", 3, 19)];
        let mut req = request(Some(1), at(9, 21));
        req.is_cold = true;

        let rec = engine().recommend(&orders, &req).unwrap();
        assert_eq!(rec.recommended_dish, "Chocolate");
        assert!(!rec.rationale.contains("cold"));
    }

    #[test]
    fn test_dish_missing_from_menu_uses_latest_order_ingredients() {
        let orders = vec![
            Order::new(1, "Retired Special", "old cheese", at(3, 12)),
            Order::new(1, "Retired Special", "new cheese, basil", at(4, 12)),
        ];

        let rec = engine().recommend(&orders, &request(Some(1), at(9, 21))).unwrap();
        assert_eq!(rec.recommended_dish, "Retired Special");
        assert_eq!(rec.ingredients, vec!["new cheese", "basil"]);
    }
}
