use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("failed to read menu file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse menu file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("menu is empty")]
    Empty,

    #[error("duplicate menu entry: {0}")]
    Duplicate(String),
}

/// A dish on the menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub name: String,
    /// Comma-separated ingredient list
    pub ingredients: String,
    pub price: f64,
}

impl MenuEntry {
    /// Ingredients split on commas and trimmed
    pub fn ingredient_list(&self) -> Vec<String> {
        split_ingredients(&self.ingredients)
    }
}

/// Splits a comma-separated ingredient string, dropping empty items
pub fn split_ingredients(ingredients: &str) -> Vec<String> {
    ingredients
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read-only menu, loaded once per process
///
/// Entries keep their file order; the first entry is the house default.
#[derive(Debug, Clone)]
pub struct MenuCatalog {
    entries: Vec<MenuEntry>,
    index: HashMap<String, usize>,
}

impl MenuCatalog {
    pub fn from_entries(entries: Vec<MenuEntry>) -> Result<Self, MenuError> {
        if entries.is_empty() {
            return Err(MenuError::Empty);
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(MenuError::Duplicate(entry.name.clone()));
            }
        }

        Ok(Self { entries, index })
    }

    /// Loads a JSON array of menu entries
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, MenuError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<MenuEntry> = serde_json::from_str(&raw)?;
        let catalog = Self::from_entries(entries)?;

        tracing::info!(
            path = %path.as_ref().display(),
            dishes = catalog.len(),
            "Menu loaded"
        );

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&MenuEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// The house default dish
    pub fn first(&self) -> &MenuEntry {
        &self.entries[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MenuEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
