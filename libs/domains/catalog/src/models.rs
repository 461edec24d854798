use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::rating::INITIAL_RATING;

/// A user comment attached to a product. Never edited once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment: String,
    pub rating: i64,
    pub username: String,
    pub email: String,
    /// Stamped by the service when the comment is appended.
    pub created_at: DateTime<Utc>,
}

/// Catalog item as stored in the `product` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", alias = "id", with = "id_as_string")]
    pub id: Uuid,
    pub title: String,
    pub price: f64,
    pub description: String,
    pub image_url: String,
    /// Remote store handle of the uploaded image.
    #[serde(default)]
    pub image_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Rounded mean of `comments[*].rating`, or [`INITIAL_RATING`] when there are none.
    pub rating: f64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Bumped by one on every committed write; conditional writes compare against it.
    pub revision: i64,
}

impl Product {
    /// Build a fresh record around an already uploaded image.
    pub fn new(input: CreateProduct, image_url: String, image_public_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: input.title,
            price: input.price,
            description: input.description,
            image_url,
            image_public_id,
            created_at: Utc::now(),
            rating: INITIAL_RATING,
            comments: Vec::new(),
            revision: 0,
        }
    }

    /// Overwrite the editable metadata. Image, rating and comments are untouched.
    pub fn apply_update(&mut self, update: UpdateProduct) {
        self.title = update.title;
        self.price = update.price;
        self.description = update.description;
    }
}

/// Metadata for a new product; the image travels separately as an [`ImageUpload`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1), custom(function = "not_blank"))]
    pub title: String,
    #[validate(custom(function = "valid_price"))]
    pub price: f64,
    #[validate(length(min = 1), custom(function = "not_blank"))]
    pub description: String,
}

/// Replacement values for the editable metadata of an existing product.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1), custom(function = "not_blank"))]
    pub title: String,
    #[validate(custom(function = "valid_price"))]
    pub price: f64,
    #[validate(length(min = 1), custom(function = "not_blank"))]
    pub description: String,
}

/// Raw uploaded image as received from the caller.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }
}

/// Comment body supplied by the caller.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1), custom(function = "not_blank"))]
    pub comment: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
}

/// Identity of an already authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAuthor {
    pub username: String,
    pub email: String,
}

impl CommentAuthor {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

impl Comment {
    pub fn new(input: NewComment, author: CommentAuthor) -> Self {
        Self {
            comment: input.comment,
            rating: input.rating,
            username: author.username,
            email: author.email,
            created_at: Utc::now(),
        }
    }
}

/// One field of a product that a field-scoped write may overwrite.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductField {
    Title(String),
    Price(f64),
    Description(String),
    Comments(Vec<Comment>),
    Rating(f64),
}

impl ProductField {
    /// Document key of the field.
    pub fn key(&self) -> &'static str {
        match self {
            ProductField::Title(_) => "title",
            ProductField::Price(_) => "price",
            ProductField::Description(_) => "description",
            ProductField::Comments(_) => "comments",
            ProductField::Rating(_) => "rating",
        }
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

/// Ids are stored as hyphenated strings so that filters built from
/// `Uuid::to_string` match whatever serializer wrote the document.
mod id_as_string {
    use super::*;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uuid::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn valid_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::new("price_out_of_range"));
    }
    Ok(())
}
