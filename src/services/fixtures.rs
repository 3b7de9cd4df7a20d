//! Order histories shared by the service tests

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{MenuCatalog, Order};

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    // June 2024: the 3rd is a Monday
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

pub fn order(menu: &MenuCatalog, customer_id: i64, dish: &str, day: u32, hour: u32) -> Order {
    let ingredients = menu
        .get(dish)
        .map(|entry| entry.ingredients.clone())
        .unwrap_or_else(|| dish.to_lowercase());
    Order::new(customer_id, dish, ingredients, at(day, hour))
}

/// Four customers with distinct habits, 40 orders in total
pub fn habitual_history(menu: &MenuCatalog) -> Vec<Order> {
    let habits: [(i64, &str, &str); 4] = [
        (1, "Pepperoni", "Calabrese"),
        (2, "Margherita", "Vegetarian"),
        (3, "Four Cheese", "Chicken with Catupiry"),
        (4, "Chocolate", "Margherita"),
    ];

    let mut orders = Vec::new();
    for (customer_id, favourite, occasional) in habits {
        for i in 0..10u32 {
            let dish = if i % 4 == 3 { occasional } else { favourite };
            orders.push(order(menu, customer_id, dish, 3 + i % 7, 18 + i % 4));
        }
    }
    orders
}
