use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProductResult;
use crate::models::{Product, ProductField};
use crate::pagination::PageQuery;

/// Persistence boundary for products.
///
/// Writes to an existing product are conditional on its `revision`: they only
/// apply when the stored revision still equals `expected_revision`, and they
/// bump it by one. A lost race surfaces as `ProductError::RevisionConflict`,
/// a missing product as `ProductError::NotFound`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> ProductResult<Option<Product>>;

    /// One window of the filtered listing, newest first, plus the filtered total.
    async fn find_page(&self, query: &PageQuery) -> ProductResult<(Vec<Product>, u64)>;

    async fn insert(&self, product: &Product) -> ProductResult<()>;

    /// Overwrite only the given fields.
    async fn apply_field_update(
        &self,
        id: Uuid,
        expected_revision: i64,
        fields: Vec<ProductField>,
    ) -> ProductResult<()>;

    /// Replace the whole document, returning it with its new revision.
    async fn replace(
        &self,
        id: Uuid,
        expected_revision: i64,
        product: &Product,
    ) -> ProductResult<Product>;

    /// Create the secondary indexes the listing relies on.
    async fn ensure_indexes(&self) -> ProductResult<()>;
}
