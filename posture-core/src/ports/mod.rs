pub mod dataset;
pub mod store;

pub use dataset::DatasetProvider;
pub use store::{CatalogSink, RuleStore};
