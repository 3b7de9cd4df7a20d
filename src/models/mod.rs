pub mod menu;
pub mod order;
pub mod recommendation;

pub use menu::{split_ingredients, MenuCatalog, MenuEntry, MenuError};
pub use order::Order;
pub use recommendation::{Recommendation, RecommendationSource};
