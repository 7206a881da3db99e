//! Category registry
//!
//! Fixed table of trend categories. The registry is built once on first use
//! and never mutated afterwards, so lookups are idempotent for the lifetime
//! of the process.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Selector value meaning "every category in the registry"
pub const ALL_SELECTOR: &str = "all";

/// A fixed topical bucket of trends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Category {
    /// Upstream category identifier (used in the retrieval URL)
    pub id: u32,
    /// Human-readable name, injected into every aggregated row
    pub name: &'static str,
    /// Lowercase short name used in request paths
    pub slug: &'static str,
}

impl Category {
    /// Name with spaces and ampersands replaced, safe for use in file names
    pub fn file_stem(&self) -> String {
        self.name.replace(' ', "_").replace('&', "and")
    }
}

const CATEGORY_TABLE: &[(u32, &str, &str)] = &[
    (0, "All categories", "all-categories"),
    (1, "Autos and vehicles", "autos"),
    (2, "Beauty and fashion", "beauty"),
    (3, "Business and finance", "business"),
    (4, "Entertainment", "entertainment"),
    (5, "Food and drink", "food"),
    (6, "Games", "games"),
    (7, "Health", "health"),
    (8, "Hobbies and leisure", "hobbies"),
    (9, "Jobs and education", "education"),
    (10, "Law and government", "law"),
    (11, "Other", "other"),
    (13, "Pets and animals", "pets"),
    (14, "Politics", "politics"),
    (15, "Science", "science"),
    (16, "Shopping", "shopping"),
    (17, "Sports", "sports"),
    (18, "Technology", "technology"),
    (19, "Travel and transportation", "travel"),
    (20, "Climate", "climate"),
];

static REGISTRY: Lazy<CategoryRegistry> = Lazy::new(|| CategoryRegistry::from_table(CATEGORY_TABLE));

/// Read-only lookup over the fixed category table
#[derive(Debug)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    by_id: HashMap<u32, usize>,
    by_slug: HashMap<&'static str, usize>,
}

impl CategoryRegistry {
    /// Process-wide registry instance
    pub fn global() -> &'static CategoryRegistry {
        &REGISTRY
    }

    fn from_table(table: &[(u32, &'static str, &'static str)]) -> Self {
        let categories: Vec<Category> = table
            .iter()
            .map(|&(id, name, slug)| Category { id, name, slug })
            .collect();

        let by_id = categories.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let by_slug = categories.iter().enumerate().map(|(i, c)| (c.slug, i)).collect();

        Self {
            categories,
            by_id,
            by_slug,
        }
    }

    /// Look up a category by its upstream identifier
    pub fn by_id(&self, id: u32) -> Result<&Category> {
        self.by_id
            .get(&id)
            .map(|&i| &self.categories[i])
            .ok_or_else(|| Error::NotFound(format!("category id {}", id)))
    }

    /// Look up a category by slug (case-insensitive)
    pub fn by_slug(&self, slug: &str) -> Result<&Category> {
        let normalized = slug.trim().to_lowercase();
        self.by_slug
            .get(normalized.as_str())
            .map(|&i| &self.categories[i])
            .ok_or_else(|| Error::NotFound(format!("category '{}'", slug)))
    }

    /// All categories in table order
    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_has_twenty_categories() {
        assert_eq!(CategoryRegistry::global().len(), 20);
    }

    #[test]
    fn test_ids_and_slugs_are_unique() {
        let registry = CategoryRegistry::global();
        let ids: HashSet<u32> = registry.all().iter().map(|c| c.id).collect();
        let slugs: HashSet<&str> = registry.all().iter().map(|c| c.slug).collect();
        assert_eq!(ids.len(), registry.len());
        assert_eq!(slugs.len(), registry.len());
        for slug in slugs {
            assert_eq!(slug, slug.to_lowercase());
            assert_ne!(slug, ALL_SELECTOR, "'all' is reserved for the selector");
        }
    }

    #[test]
    fn test_lookup_by_id_is_idempotent() {
        let registry = CategoryRegistry::global();
        let first = registry.by_id(18).unwrap().clone();
        let second = registry.by_id(18).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.name, "Technology");
    }

    #[test]
    fn test_lookup_by_slug_normalizes_case() {
        let registry = CategoryRegistry::global();
        assert_eq!(registry.by_slug("Sports").unwrap().id, 17);
        assert_eq!(registry.by_slug("  climate ").unwrap().id, 20);
    }

    #[test]
    fn test_unknown_lookups_fail_with_not_found() {
        let registry = CategoryRegistry::global();
        assert!(matches!(registry.by_id(12), Err(Error::NotFound(_))));
        assert!(matches!(registry.by_slug("gardening"), Err(Error::NotFound(_))));
        assert!(matches!(registry.by_slug(ALL_SELECTOR), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_file_stem_replaces_spaces() {
        let registry = CategoryRegistry::global();
        assert_eq!(registry.by_id(19).unwrap().file_stem(), "Travel_and_transportation");
    }
}
