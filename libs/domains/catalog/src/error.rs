use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProductError {
    /// Malformed or missing input, rejected before any I/O.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No product for the given id. Unparsable ids land here too.
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Image could not be decoded: {0}")]
    Decode(String),

    #[error("Image could not be encoded: {0}")]
    Encode(String),

    #[error("Asset upload failed: {0}")]
    Upload(String),

    #[error("Store error: {0}")]
    Store(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Product {0} was modified concurrently")]
    RevisionConflict(Uuid),

    /// Every write attempt lost against concurrent writers.
    #[error("Product {id} is under contention, gave up after {attempts} attempts")]
    Conflict { id: Uuid, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProductResult<T> = Result<T, ProductError>;

impl ProductError {
    pub fn not_found(id: impl ToString) -> Self {
        ProductError::NotFound(id.to_string())
    }
}

impl From<mongodb::error::Error> for ProductError {
    fn from(err: mongodb::error::Error) -> Self {
        ProductError::Store(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for ProductError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        ProductError::Store(format!("failed to serialize document: {err}"))
    }
}

impl From<reqwest::Error> for ProductError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProductError::Upload("upload timed out".to_string())
        } else {
            ProductError::Upload(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for ProductError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProductError::Validation(err.to_string())
    }
}
