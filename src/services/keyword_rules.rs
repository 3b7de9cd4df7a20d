use serde::{Deserialize, Serialize};

/// Boolean dish attributes derived from keywords
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DishFlag {
    Vegetarian,
    Spicy,
    Sweet,
}

impl DishFlag {
    /// Every flag, in feature column order
    pub const ALL: [DishFlag; 3] = [DishFlag::Vegetarian, DishFlag::Spicy, DishFlag::Sweet];

    /// Feature column carrying this flag
    pub fn column(self) -> &'static str {
        match self {
            DishFlag::Vegetarian => "is_vegetarian",
            DishFlag::Spicy => "is_spicy",
            DishFlag::Sweet => "is_sweet",
        }
    }
}

/// Text a rule is matched against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Ingredients,
    DishName,
}

/// Sets `flag` when any keyword occurs in `field` (case-insensitive substring)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRule {
    pub flag: DishFlag,
    pub field: MatchField,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(flag: DishFlag, field: MatchField, keywords: &[&str]) -> Self {
        Self {
            flag,
            field,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, dish_lower: &str, ingredients_lower: &str) -> bool {
        let haystack = match self.field {
            MatchField::Ingredients => ingredients_lower,
            MatchField::DishName => dish_lower,
        };
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

/// Flags evaluated for one dish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DishFlags {
    pub vegetarian: bool,
    pub spicy: bool,
    pub sweet: bool,
}

impl DishFlags {
    pub fn get(&self, flag: DishFlag) -> bool {
        match flag {
            DishFlag::Vegetarian => self.vegetarian,
            DishFlag::Spicy => self.spicy,
            DishFlag::Sweet => self.sweet,
        }
    }

    fn set(&mut self, flag: DishFlag) {
        match flag {
            DishFlag::Vegetarian => self.vegetarian = true,
            DishFlag::Spicy => self.spicy = true,
            DishFlag::Sweet => self.sweet = true,
        }
    }
}

/// Ordered list of keyword rules; a flag is set when any of its rules matches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRules {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::new(vec![
            KeywordRule::new(
                DishFlag::Vegetarian,
                MatchField::Ingredients,
                &[
                    "tomato",
                    "onion",
                    "bell pepper",
                    "pea",
                    "corn",
                    "eggplant",
                    "spinach",
                    "broccoli",
                    "heart of palm",
                ],
            ),
            KeywordRule::new(
                DishFlag::Spicy,
                MatchField::Ingredients,
                &["pepperoni", "calabrese", "chili", "jalapeño", "catupiry"],
            ),
            KeywordRule::new(
                DishFlag::Sweet,
                MatchField::DishName,
                &["chocolate", "dulce de leite", "banana"],
            ),
        ])
    }
}

impl KeywordRules {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, dish: &str, ingredients: &str) -> DishFlags {
        let dish_lower = dish.to_lowercase();
        let ingredients_lower = ingredients.to_lowercase();

        let mut flags = DishFlags::default();
        for rule in &self.rules {
            if !flags.get(rule.flag) && rule.matches(&dish_lower, &ingredients_lower) {
                flags.set(rule.flag);
            }
        }
        flags
    }
}

/// Case-insensitive test for any keyword occurring in `text`
pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .any(|k| lowered.contains(k.to_lowercase().as_str()))
}
