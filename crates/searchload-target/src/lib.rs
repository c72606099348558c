//! Search service that searchload traffic is aimed at.
//!
//! Serves `GET /search?q=<query>` over a generated product catalog. Every
//! search inspects a fixed window of [`catalog::PRODUCTS_PER_SEARCH`] products,
//! so per-request cost stays flat no matter how large the catalog grows.

pub mod catalog;
pub mod server;

pub use catalog::{Product, ProductCatalog, SearchResult};
pub use server::{TargetConfig, TargetMetrics, TargetServer, router};
