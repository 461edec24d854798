//! Catalog Domain
//!
//! Products with an uploaded image, user comments and a derived rating,
//! stored in MongoDB.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  ProductService  │  ← validation, orchestration, conflict retries
//! └──┬─────┬──────┬──┘
//!    │     │      │
//!    │  ┌──▼───┐ ┌▼──────────────┐
//!    │  │image │ │ AssetUploader │  ← Cloudinary (or in-memory mock)
//!    │  │norm. │ └───────────────┘
//!    │  └──────┘
//! ┌──▼──────────────┐
//! │ProductRepository│  ← trait + MongoDB implementation
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_catalog::{
//!     CatalogSettings, CloudinaryConfig, CloudinaryUploader, MongoProductRepository,
//!     PageQuery, ProductService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
//! let db = client.database("catalog");
//!
//! let repository = MongoProductRepository::new(&db);
//! let uploader = CloudinaryUploader::new(CloudinaryConfig::new("demo", "key", "secret"))?;
//! let service = ProductService::new(repository, uploader, CatalogSettings::default());
//!
//! let page = service.list_products(PageQuery::new(1, 10).with_search("mug")).await?;
//! println!("{} products", page.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod mongodb;
pub mod normalizer;
pub mod pagination;
pub mod rating;
pub mod repository;
pub mod service;
pub mod uploader;

pub use config::CatalogSettings;
pub use error::{ProductError, ProductResult};
pub use models::{
    Comment, CommentAuthor, CreateProduct, ImageUpload, NewComment, Product, ProductField,
    ProductPage, UpdateProduct,
};
pub use mongodb::MongoProductRepository;
pub use pagination::{PageQuery, RawPageQuery};
pub use rating::INITIAL_RATING;
pub use repository::ProductRepository;
pub use service::ProductService;
pub use uploader::{
    AssetUploader, CloudinaryConfig, CloudinaryUploader, MockAssetUploader, SignatureAlgorithm,
    UploadedAsset,
};
