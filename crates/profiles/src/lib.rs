//! Named configuration profiles organized by category.
//!
//! A profile is one [`EnvStore`](envprof_store::EnvStore) file at
//! `<base_dir>/<category>/<name>.env`. [`ProfileManager`] is the registry
//! over that tree; [`AppDefaults`] records which profile an application
//! prefers per category.

pub mod app_defaults;
pub mod error;
pub mod manager;

pub use app_defaults::AppDefaults;
pub use error::{ProfileError, Result};
pub use manager::{CategoryPolicy, ProfileManager};
