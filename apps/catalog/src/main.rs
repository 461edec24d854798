//! Catalog CLI
//!
//! Operator tool for the product catalog. Every collaborator (MongoDB client,
//! repository, asset uploader, service) is built here at startup and passed
//! down explicitly. Results are printed as JSON.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::FromEnv;
use domain_catalog::{
    CommentAuthor, CreateProduct, ImageUpload, MongoProductRepository, NewComment, PageQuery,
    ProductService, RawPageQuery, UpdateProduct,
};
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use tracing::info;

mod config;
mod uploader;

use config::Config;
use uploader::AppUploader;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Manage catalog products stored in MongoDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products, newest first
    List {
        /// Page number; invalid values fall back to 1
        #[arg(long, allow_hyphen_values = true)]
        page: Option<String>,

        /// Page size; invalid values fall back to 10
        #[arg(long, allow_hyphen_values = true)]
        per_page: Option<String>,

        /// Case-insensitive substring of the title
        #[arg(short, long)]
        search: Option<String>,

        /// Lower price bound, 0 means unbounded
        #[arg(long, allow_hyphen_values = true)]
        min_price: Option<String>,

        /// Upper price bound, 0 means unbounded
        #[arg(long, allow_hyphen_values = true)]
        max_price: Option<String>,
    },

    /// Show one product
    Get { id: String },

    /// Create a product from an image file
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        price: f64,

        #[arg(long)]
        description: String,

        /// Image file (any format the decoder understands)
        #[arg(long)]
        image: PathBuf,
    },

    /// Replace title, price and description of a product
    Update {
        id: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        price: f64,

        #[arg(long)]
        description: String,
    },

    /// Add a rated comment on behalf of an authenticated user
    Comment {
        id: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        /// 1 to 5
        #[arg(long)]
        rating: i64,

        #[arg(long)]
        text: String,
    },

    /// Create the indexes used by listing
    InitIndexes,

    /// Check MongoDB connectivity
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let cli = Cli::parse();

    info!(database = config.mongo.database(), "Connecting to MongoDB...");
    let client = database::mongodb::connect_from_config_with_retry(&config.mongo, None)
        .await
        .map_err(|e| eyre::eyre!("MongoDB connection failed: {}", e))?;

    let db = client.database(config.mongo.database());
    let repository =
        MongoProductRepository::new(&db).with_timeout(config.mongo.operation_timeout());
    let uploader = AppUploader::from_config(config.cloudinary.clone())?;
    let service = ProductService::new(repository, uploader, config.catalog);

    match cli.command {
        Commands::List {
            page,
            per_page,
            search,
            min_price,
            max_price,
        } => {
            let query = PageQuery::parse(&RawPageQuery {
                page,
                per_page,
                search,
                min_price,
                max_price,
            })?;
            let page = service.list_products(query).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }

        Commands::Get { id } => {
            let product = service.get_product(&id).await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }

        Commands::Create {
            title,
            price,
            description,
            image,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .wrap_err_with(|| format!("failed to read {}", image.display()))?;
            let filename = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let product = service
                .create_product(
                    CreateProduct {
                        title,
                        price,
                        description,
                    },
                    ImageUpload::new(bytes, filename),
                )
                .await?;
            info!(product_id = %product.id, "Product created");
            println!("{}", serde_json::to_string_pretty(&product)?);
        }

        Commands::Update {
            id,
            title,
            price,
            description,
        } => {
            let product = service
                .update_product(
                    &id,
                    UpdateProduct {
                        title,
                        price,
                        description,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }

        Commands::Comment {
            id,
            username,
            email,
            rating,
            text,
        } => {
            let product = service
                .add_comment(
                    &id,
                    CommentAuthor::new(username, email),
                    NewComment {
                        comment: text,
                        rating,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }

        Commands::InitIndexes => {
            service.ensure_indexes().await?;
            info!("Indexes ready");
        }

        Commands::Health => {
            let status = database::mongodb::check_health(&client).await;
            println!(
                "{}",
                serde_json::json!({
                    "healthy": status.healthy,
                    "message": status.message,
                    "response_time_ms": status.response_time_ms,
                })
            );
            if !status.healthy {
                eyre::bail!(
                    "MongoDB is unhealthy: {}",
                    status.message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
