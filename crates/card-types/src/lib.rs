//! # card-types
//!
//! Shared domain types for cardmatch.
//!
//! - `CardRecord`: one catalog row (identifier, image URL, open-ended fields)
//! - `catalog`: CSV / JSON / JSON Lines catalog reader
//! - `Settings`: layered configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use card_types::{read_catalog, Settings};
//!
//! let settings = Settings::load(None).unwrap();
//! let records = read_catalog(settings.catalog_path()).unwrap();
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod record;

pub use catalog::{load_catalog, read_catalog, Catalog, CatalogFormat, RejectedRow};
pub use config::{FetchSettings, ModelSettings, Settings};
pub use error::CardError;
pub use record::{reference_image_path, safe_name, CardRecord};
