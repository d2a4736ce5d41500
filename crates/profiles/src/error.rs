use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    /// An operation that requires the profile's backing file found none.
    #[error("profile not found: {category}/{name}")]
    NotFound { category: String, name: String },

    /// A validated write found required keys missing or empty. Nothing was
    /// written.
    #[error("profile {category}/{name} missing required keys: {}", .missing.join(", "))]
    Validation {
        category: String,
        name: String,
        /// Offending keys in the category's declared order.
        missing: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
