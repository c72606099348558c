use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

pub const BRANDS: [&str; 10] = [
    "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta", "Iota", "Kappa",
];

pub const CATEGORIES: [&str; 10] = [
    "Electronics",
    "Books",
    "Home",
    "Sports",
    "Toys",
    "Fashion",
    "Garden",
    "Automotive",
    "Health",
    "Office",
];

const ADJECTIVES: [&str; 10] = [
    "Premium",
    "Professional",
    "Essential",
    "Ultimate",
    "Advanced",
    "Basic",
    "Deluxe",
    "Standard",
    "Plus",
    "Pro",
];

const PRODUCT_TYPES: [&str; 10] = [
    "Device",
    "Tool",
    "Kit",
    "System",
    "Solution",
    "Package",
    "Bundle",
    "Set",
    "Collection",
    "Series",
];

/// Number of consecutive products inspected by a single search.
pub const PRODUCTS_PER_SEARCH: usize = 100;

/// Maximum number of matches returned to the caller.
pub const MAX_RESULTS: usize = 20;

/// Catalog size used when nothing else is configured.
pub const DEFAULT_CATALOG_SIZE: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub category: &'static str,
    pub description: String,
    pub brand: &'static str,
}

/// Outcome of one bounded search over the catalog.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub products: Vec<Product>,
    pub total_found: usize,
    pub elapsed: Duration,
}

/// Read-only product catalog addressed by 1-based product id.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    /// Generate `count` products. Brand and category cycle with the id; the
    /// description mixes in a random adjective and product type.
    pub fn generate<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let products = (1..=count as u64)
            .map(|id| {
                let slot = (id % 10) as usize;
                let brand = BRANDS[slot];
                let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
                let product_type = PRODUCT_TYPES[rng.gen_range(0..PRODUCT_TYPES.len())];
                Product {
                    id,
                    name: format!("Product {brand} {id}"),
                    category: CATEGORIES[slot],
                    description: format!(
                        "{adjective} {brand} {product_type} - High quality product for your needs"
                    ),
                    brand,
                }
            })
            .collect();
        Self { products }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Product> {
        let index = id.checked_sub(1)?;
        self.products.get(usize::try_from(index).ok()?)
    }

    /// Case-insensitive substring search over name and category, restricted
    /// to a window of [`PRODUCTS_PER_SEARCH`] products starting at a random id.
    pub fn bounded_search<R: Rng + ?Sized>(&self, query: &str, rng: &mut R) -> SearchResult {
        let started = Instant::now();
        let needle = query.to_lowercase();

        let start = if self.products.len() > PRODUCTS_PER_SEARCH {
            rng.gen_range(1..=self.products.len() - PRODUCTS_PER_SEARCH) as u64
        } else {
            1
        };

        let mut products = Vec::new();
        let mut total_found = 0usize;
        for id in start..start + PRODUCTS_PER_SEARCH as u64 {
            let Some(product) = self.get(id) else {
                continue;
            };
            if product.name.to_lowercase().contains(&needle)
                || product.category.to_lowercase().contains(&needle)
            {
                total_found += 1;
                if products.len() < MAX_RESULTS {
                    products.push(product.clone());
                }
            }
        }

        SearchResult {
            products,
            total_found,
            elapsed: started.elapsed(),
        }
    }
}
