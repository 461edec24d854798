//! Product Service - orchestrates normalization, upload, rating and persistence

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::CatalogSettings;
use crate::error::{ProductError, ProductResult};
use crate::models::{
    Comment, CommentAuthor, CreateProduct, ImageUpload, NewComment, Product, ProductField,
    ProductPage, UpdateProduct,
};
use crate::normalizer;
use crate::pagination::{total_pages, PageQuery};
use crate::rating::{self, INITIAL_RATING};
use crate::repository::ProductRepository;
use crate::uploader::AssetUploader;

/// Entry point for every catalog operation.
///
/// Holds no mutable state of its own; clones share the same collaborators.
/// Writes to existing products are optimistic: a write that loses against a
/// concurrent one is retried on a fresh snapshot, up to
/// [`CatalogSettings::max_write_attempts`] times.
pub struct ProductService<R: ProductRepository, U: AssetUploader> {
    repository: Arc<R>,
    uploader: Arc<U>,
    settings: CatalogSettings,
}

impl<R: ProductRepository, U: AssetUploader> Clone for ProductService<R, U> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            uploader: Arc::clone(&self.uploader),
            settings: self.settings,
        }
    }
}

impl<R: ProductRepository, U: AssetUploader> ProductService<R, U> {
    pub fn new(repository: R, uploader: U, settings: CatalogSettings) -> Self {
        Self {
            repository: Arc::new(repository),
            uploader: Arc::new(uploader),
            settings,
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// One page of products, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: PageQuery) -> ProductResult<ProductPage> {
        let (products, total) = self.repository.find_page(&query).await?;
        Ok(ProductPage {
            products,
            total,
            page: query.page,
            per_page: query.per_page,
            total_pages: total_pages(total, query.per_page),
        })
    }

    /// Fetch one product. An id that is not a UUID is reported as not found.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &str) -> ProductResult<Product> {
        let id = parse_id(id)?;
        self.load(id).await
    }

    /// Normalize and upload the image, then persist a fresh product around it.
    ///
    /// Nothing is written to the store unless both normalization and upload
    /// succeed. If the insert fails the uploaded asset is deleted best-effort.
    #[instrument(skip(self, input, image), fields(title = %input.title, filename = %image.filename))]
    pub async fn create_product(
        &self,
        input: CreateProduct,
        image: ImageUpload,
    ) -> ProductResult<Product> {
        input.validate()?;
        if image.bytes.is_empty() {
            return Err(ProductError::Validation("image is required".to_string()));
        }

        let ImageUpload { bytes, filename } = image;
        let normalized =
            tokio::task::spawn_blocking(move || normalizer::normalize(&bytes, &filename))
                .await
                .map_err(|e| ProductError::Internal(format!("image worker failed: {e}")))??;

        let asset = self
            .uploader
            .upload(normalized.bytes, &normalized.filename)
            .await?;

        let product = Product::new(input, asset.secure_url, Some(asset.public_id.clone()));
        if let Err(err) = self.repository.insert(&product).await {
            self.discard_asset(&asset.public_id).await;
            return Err(err);
        }

        Ok(product)
    }

    /// Overwrite title, price and description. Image, rating and comments keep
    /// whatever the stored product holds at write time.
    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: &str, input: UpdateProduct) -> ProductResult<Product> {
        input.validate()?;
        let id = parse_id(id)?;

        for attempt in 1..=self.max_attempts() {
            let mut product = self.load(id).await?;
            let expected = product.revision;
            product.apply_update(input.clone());

            match self.repository.replace(id, expected, &product).await {
                Ok(saved) => return Ok(saved),
                Err(ProductError::RevisionConflict(_)) => {
                    debug!(product_id = %id, attempt, "update lost a race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.contended(id))
    }

    /// Append a comment and recompute the aggregate rating.
    #[instrument(skip(self, author, input), fields(username = %author.username))]
    pub async fn add_comment(
        &self,
        id: &str,
        author: CommentAuthor,
        input: NewComment,
    ) -> ProductResult<Product> {
        input.validate()?;
        let id = parse_id(id)?;
        let comment = Comment::new(input, author);

        for attempt in 1..=self.max_attempts() {
            let mut product = self.load(id).await?;
            let expected = product.revision;
            product.comments.push(comment.clone());
            product.rating = rating::recompute(&product.comments).unwrap_or(INITIAL_RATING);

            let fields = vec![
                ProductField::Comments(product.comments.clone()),
                ProductField::Rating(product.rating),
            ];
            match self.repository.apply_field_update(id, expected, fields).await {
                Ok(()) => {
                    product.revision = expected + 1;
                    debug!(product_id = %id, rating = product.rating, "comment added");
                    return Ok(product);
                }
                Err(ProductError::RevisionConflict(_)) => {
                    debug!(product_id = %id, attempt, "comment lost a race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.contended(id))
    }

    /// Create the store indexes used by listing.
    pub async fn ensure_indexes(&self) -> ProductResult<()> {
        self.repository.ensure_indexes().await
    }

    async fn load(&self, id: Uuid) -> ProductResult<Product> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ProductError::not_found(id))
    }

    async fn discard_asset(&self, public_id: &str) {
        match self.uploader.delete(public_id).await {
            Ok(()) => debug!(public_id, "removed asset of failed create"),
            Err(e) => warn!(
                public_id,
                uploader = self.uploader.name(),
                error = %e,
                "orphaned asset left behind after failed create"
            ),
        }
    }

    fn max_attempts(&self) -> u32 {
        self.settings.max_write_attempts.max(1)
    }

    fn contended(&self, id: Uuid) -> ProductError {
        let attempts = self.max_attempts();
        warn!(product_id = %id, attempts, "giving up on contended product");
        ProductError::Conflict { id, attempts }
    }
}

fn parse_id(raw: &str) -> ProductResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ProductError::not_found(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockProductRepository;
    use crate::uploader::MockAssetUploader;
    use image::{ImageFormat, RgbImage};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn create_input() -> CreateProduct {
        CreateProduct {
            title: "Red Mug".to_string(),
            price: 12.5,
            description: "Ceramic mug".to_string(),
        }
    }

    fn stored(revision: i64) -> Product {
        let mut product = Product::new(
            create_input(),
            "https://assets.test/images/1-mug.jpg".to_string(),
            Some("images/1-mug.jpg".to_string()),
        );
        product.revision = revision;
        product
    }

    fn comment(rating: i64) -> NewComment {
        NewComment {
            comment: "nice".to_string(),
            rating,
        }
    }

    fn author() -> CommentAuthor {
        CommentAuthor::new("ana", "ana@example.com")
    }

    fn service(
        repo: MockProductRepository,
        uploader: MockAssetUploader,
    ) -> ProductService<MockProductRepository, MockAssetUploader> {
        ProductService::new(repo, uploader, CatalogSettings::default())
    }

    #[tokio::test]
    async fn test_create_product_uploads_then_inserts() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert().times(1).returning(|_| Ok(()));
        let uploader = MockAssetUploader::new();

        let product = service(repo, uploader.clone())
            .create_product(create_input(), ImageUpload::new(png(2400, 1200), "mug.png"))
            .await
            .unwrap();

        assert_eq!(product.rating, 1.0);
        assert!(product.comments.is_empty());
        assert_eq!(product.image_url, "https://assets.test/images/1-mug.jpg");

        let uploads = uploader.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "mug.jpg");
        let uploaded = image::load_from_memory(&uploads[0].bytes).unwrap();
        assert_eq!((uploaded.width(), uploaded.height()), (1200, 600));
    }

    #[tokio::test]
    async fn test_create_with_garbage_image_writes_nothing() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert().never();
        let uploader = MockAssetUploader::new();

        let err = service(repo, uploader.clone())
            .create_product(create_input(), ImageUpload::new(b"not an image".to_vec(), "x.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Decode(_)));
        assert_eq!(uploader.upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_before_any_io() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert().never();
        let uploader = MockAssetUploader::new();
        let mut input = create_input();
        input.title = "  ".to_string();

        let err = service(repo, uploader.clone())
            .create_product(input, ImageUpload::new(png(10, 10), "mug.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Validation(_)));
        assert_eq!(uploader.upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_requires_image_bytes() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert().never();

        let err = service(repo, MockAssetUploader::new())
            .create_product(create_input(), ImageUpload::new(Vec::new(), "mug.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_create() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert().never();

        let err = service(repo, MockAssetUploader::failing("timed out"))
            .create_product(create_input(), ImageUpload::new(png(10, 10), "mug.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Upload(_)));
    }

    #[tokio::test]
    async fn test_insert_failure_deletes_uploaded_asset() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert()
            .returning(|_| Err(ProductError::Store("disk full".to_string())));
        let uploader = MockAssetUploader::new();

        let err = service(repo, uploader.clone())
            .create_product(create_input(), ImageUpload::new(png(10, 10), "mug.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Store(msg) if msg == "disk full"));
        assert_eq!(uploader.deleted().await, vec!["images/1-mug.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_store_error() {
        let mut repo = MockProductRepository::new();
        repo.expect_insert()
            .returning(|_| Err(ProductError::Store("disk full".to_string())));
        let uploader = MockAssetUploader::failing_deletes("store offline");

        let err = service(repo, uploader.clone())
            .create_product(create_input(), ImageUpload::new(png(10, 10), "mug.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Store(_)));
        assert_eq!(uploader.deleted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_product_with_malformed_id_is_not_found() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id().never();

        let err = service(repo, MockAssetUploader::new())
            .get_product("not-a-uuid")
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::NotFound(id) if id == "not-a-uuid"));
    }

    #[tokio::test]
    async fn test_get_product_missing() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let err = service(repo, MockAssetUploader::new())
            .get_product(&Uuid::now_v7().to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_products_derives_total_pages() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_page()
            .withf(|q| q.page == 2 && q.per_page == 10 && q.search == "red")
            .returning(|_| Ok((vec![stored(0)], 25)));

        let page = service(repo, MockAssetUploader::new())
            .list_products(PageQuery::new(2, 10).with_search("red"))
            .await
            .unwrap();

        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.products.len(), 1);
    }

    #[tokio::test]
    async fn test_list_products_empty() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_page().returning(|_| Ok((vec![], 0)));

        let page = service(repo, MockAssetUploader::new())
            .list_products(PageQuery::default())
            .await
            .unwrap();

        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn test_update_keeps_image_rating_and_comments() {
        let mut existing = stored(2);
        existing.rating = 4.5;
        existing.comments = vec![Comment::new(comment(5), author()), Comment::new(comment(4), author())];
        let id = existing.id;
        let snapshot = existing.clone();

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .with(eq(id))
            .returning(move |_| Ok(Some(snapshot.clone())));
        repo.expect_replace()
            .withf(move |rid, expected, _| *rid == id && *expected == 2)
            .returning(|_, expected, product| {
                let mut saved = product.clone();
                saved.revision = expected + 1;
                Ok(saved)
            });

        let updated = service(repo, MockAssetUploader::new())
            .update_product(
                &id.to_string(),
                UpdateProduct {
                    title: "Blue Mug".to_string(),
                    price: 9.0,
                    description: "Glazed".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Blue Mug");
        assert_eq!(updated.price, 9.0);
        assert_eq!(updated.image_url, existing.image_url);
        assert_eq!(updated.rating, existing.rating);
        assert_eq!(updated.comments, existing.comments);
        assert_eq!(updated.revision, 3);
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));
        repo.expect_replace().never();

        let err = service(repo, MockAssetUploader::new())
            .update_product(
                &Uuid::now_v7().to_string(),
                UpdateProduct {
                    title: "Mug".to_string(),
                    price: 1.0,
                    description: "d".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_add_comment_recomputes_rating() {
        let mut existing = stored(0);
        existing.comments = vec![Comment::new(comment(5), author())];
        existing.rating = 5.0;
        let id = existing.id;

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_apply_field_update()
            .withf(move |rid, expected, fields| {
                *rid == id
                    && *expected == 0
                    && fields.len() == 2
                    && matches!(&fields[0], ProductField::Comments(c) if c.len() == 2)
                    && fields[1] == ProductField::Rating(4.5)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let product = service(repo, MockAssetUploader::new())
            .add_comment(&id.to_string(), author(), comment(4))
            .await
            .unwrap();

        assert_eq!(product.rating, 4.5);
        assert_eq!(product.comments.len(), 2);
        assert_eq!(product.comments[1].username, "ana");
        assert_eq!(product.revision, 1);
    }

    #[tokio::test]
    async fn test_add_comment_rejects_out_of_range_rating() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id().never();

        let err = service(repo, MockAssetUploader::new())
            .add_comment(&Uuid::now_v7().to_string(), author(), comment(9))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_retries_after_losing_to_a_comment() {
        // The update reads revision 0, a comment commits in between (revision 1),
        // the first replace loses, the retry sees the comment and keeps it.
        let before = stored(0);
        let id = before.id;
        let mut after_comment = before.clone();
        after_comment.comments = vec![Comment::new(comment(4), author())];
        after_comment.rating = 4.0;
        after_comment.revision = 1;

        let mut seq = Sequence::new();
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(before.clone())));
        repo.expect_replace()
            .withf(|_, expected, _| *expected == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id, _, _| Err(ProductError::RevisionConflict(id)));
        let fresh = after_comment.clone();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(fresh.clone())));
        repo.expect_replace()
            .withf(|_, expected, product| *expected == 1 && product.comments.len() == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, expected, product| {
                let mut saved = product.clone();
                saved.revision = expected + 1;
                Ok(saved)
            });

        let updated = service(repo, MockAssetUploader::new())
            .update_product(
                &id.to_string(),
                UpdateProduct {
                    title: "Blue Mug".to_string(),
                    price: 9.0,
                    description: "Glazed".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Blue Mug");
        assert_eq!(updated.comments, after_comment.comments);
        assert_eq!(updated.rating, 4.0);
        assert_eq!(updated.revision, 2);
    }

    #[tokio::test]
    async fn test_comment_retries_after_losing_to_an_update() {
        let before = stored(0);
        let id = before.id;
        let mut after_update = before.clone();
        after_update.title = "Blue Mug".to_string();
        after_update.revision = 1;

        let mut seq = Sequence::new();
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(before.clone())));
        repo.expect_apply_field_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id, _, _| Err(ProductError::RevisionConflict(id)));
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(after_update.clone())));
        repo.expect_apply_field_update()
            .withf(|_, expected, _| *expected == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let product = service(repo, MockAssetUploader::new())
            .add_comment(&id.to_string(), author(), comment(3))
            .await
            .unwrap();

        assert_eq!(product.title, "Blue Mug");
        assert_eq!(product.rating, 3.0);
        assert_eq!(product.revision, 2);
    }

    #[tokio::test]
    async fn test_persistent_contention_gives_up() {
        let existing = stored(0);
        let id = existing.id;

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .times(3)
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_apply_field_update()
            .times(3)
            .returning(|id, _, _| Err(ProductError::RevisionConflict(id)));

        let service = ProductService::new(
            repo,
            MockAssetUploader::new(),
            CatalogSettings::default().with_max_write_attempts(3),
        );
        let err = service
            .add_comment(&id.to_string(), author(), comment(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Conflict { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_store_error_is_not_retried() {
        let existing = stored(0);

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_apply_field_update()
            .times(1)
            .returning(|_, _, _| Err(ProductError::Store("timed out".to_string())));

        let err = service(repo, MockAssetUploader::new())
            .add_comment(&Uuid::now_v7().to_string(), author(), comment(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductError::Store(_)));
    }
}
