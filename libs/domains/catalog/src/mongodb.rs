//! MongoDB implementation of ProductRepository

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    options::{FindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use std::future::Future;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ProductError, ProductResult};
use crate::models::{Product, ProductField};
use crate::pagination::PageQuery;
use crate::repository::ProductRepository;

pub const COLLECTION_NAME: &str = "product";

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MongoProductRepository {
    collection: Collection<Product>,
    timeout: Duration,
}

impl MongoProductRepository {
    pub fn new(db: &Database) -> Self {
        Self::with_collection(db, COLLECTION_NAME)
    }

    pub fn with_collection(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<Product>(collection_name),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Deadline applied to every store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn collection(&self) -> &Collection<Product> {
        &self.collection
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> ProductResult<T>
    where
        F: Future<Output = ProductResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                tracing::warn!(operation, timeout = ?self.timeout, "store call timed out");
                ProductError::Store(format!("{operation} timed out after {:?}", self.timeout))
            })?
    }

    fn build_filter(query: &PageQuery) -> Document {
        let mut filter = doc! {};

        if query.has_search() {
            filter.insert(
                "title",
                doc! { "$regex": regex::escape(&query.search), "$options": "i" },
            );
        }

        let (min, max) = (query.min_bound(), query.max_bound());
        if min.is_some() || max.is_some() {
            let mut price = doc! {};
            if let Some(min) = min {
                price.insert("$gte", min);
            }
            if let Some(max) = max {
                price.insert("$lte", max);
            }
            filter.insert("price", price);
        }

        filter
    }

    fn id_filter(id: Uuid) -> Document {
        doc! { "_id": id.to_string() }
    }

    fn revision_filter(id: Uuid, expected_revision: i64) -> Document {
        doc! { "_id": id.to_string(), "revision": expected_revision }
    }

    fn field_value(field: &ProductField) -> ProductResult<Bson> {
        Ok(match field {
            ProductField::Title(title) => Bson::String(title.clone()),
            ProductField::Price(price) => Bson::Double(*price),
            ProductField::Description(description) => Bson::String(description.clone()),
            ProductField::Comments(comments) => to_bson(comments)?,
            ProductField::Rating(rating) => Bson::Double(*rating),
        })
    }

    fn build_update(fields: &[ProductField]) -> ProductResult<Document> {
        let mut set = doc! {};
        for field in fields {
            set.insert(field.key(), Self::field_value(field)?);
        }
        Ok(doc! { "$set": set, "$inc": { "revision": 1_i64 } })
    }

    /// Tell a lost race apart from a missing product after a write matched nothing.
    async fn unmatched(&self, id: Uuid) -> ProductError {
        match self.collection.find_one(Self::id_filter(id)).await {
            Ok(Some(_)) => ProductError::RevisionConflict(id),
            Ok(None) => ProductError::not_found(id),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl ProductRepository for MongoProductRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> ProductResult<Option<Product>> {
        self.bounded("find_by_id", async {
            Ok::<_, ProductError>(self.collection.find_one(Self::id_filter(id)).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_page(&self, query: &PageQuery) -> ProductResult<(Vec<Product>, u64)> {
        let filter = Self::build_filter(query);

        self.bounded("find_page", async {
            let total = self.collection.count_documents(filter.clone()).await?;

            // v7 ids sort by creation time
            let options = FindOptions::builder()
                .skip(query.offset())
                .limit(query.per_page as i64)
                .sort(doc! { "_id": -1 })
                .build();

            let cursor = self.collection.find(filter).with_options(options).await?;
            let products: Vec<Product> = cursor.try_collect().await?;
            Ok::<_, ProductError>((products, total))
        })
        .await
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn insert(&self, product: &Product) -> ProductResult<()> {
        self.bounded("insert", async {
            self.collection.insert_one(product).await?;
            Ok::<_, ProductError>(())
        })
        .await?;

        tracing::info!(product_id = %product.id, "Product created successfully");
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn apply_field_update(
        &self,
        id: Uuid,
        expected_revision: i64,
        fields: Vec<ProductField>,
    ) -> ProductResult<()> {
        let update = Self::build_update(&fields)?;

        self.bounded("apply_field_update", async {
            let result = self
                .collection
                .update_one(Self::revision_filter(id, expected_revision), update)
                .await?;
            if result.matched_count == 0 {
                return Err(self.unmatched(id).await);
            }
            Ok::<_, ProductError>(())
        })
        .await
    }

    #[instrument(skip(self, product))]
    async fn replace(
        &self,
        id: Uuid,
        expected_revision: i64,
        product: &Product,
    ) -> ProductResult<Product> {
        let mut next = product.clone();
        next.id = id;
        next.revision = expected_revision + 1;

        self.bounded("replace", async {
            let result = self
                .collection
                .replace_one(Self::revision_filter(id, expected_revision), &next)
                .await?;
            if result.matched_count == 0 {
                return Err(self.unmatched(id).await);
            }
            Ok::<_, ProductError>(())
        })
        .await?;

        tracing::info!(product_id = %id, revision = next.revision, "Product updated successfully");
        Ok(next)
    }

    async fn ensure_indexes(&self) -> ProductResult<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "title": 1 })
                .options(IndexOptions::builder().name("idx_title".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "price": 1 })
                .options(IndexOptions::builder().name("idx_price".to_string()).build())
                .build(),
        ];

        self.bounded("ensure_indexes", async {
            self.collection.create_indexes(indexes).await?;
            Ok::<_, ProductError>(())
        })
        .await?;
        tracing::info!("Product indexes created successfully");
        Ok(())
    }
}
