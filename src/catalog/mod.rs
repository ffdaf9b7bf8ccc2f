//! System catalog: the persistent registry of table schemas.

mod catalog_store;

pub use catalog_store::CatalogStore;
