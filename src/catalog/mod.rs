//! Track catalog lookups.

mod client;

pub use client::{Catalog, CatalogClient, DEFAULT_BASE_URL};
