use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Department, Product, ProductVariant, StockStatus, VariantSize},
    storage::{Attachment, MediaStorage},
};

/// A media slot in the payload: either a path that is already stored, or the
/// name of a multipart part carrying a new file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaRef {
    Stored(String),
    Upload(String),
}

/// JSON carried in the `payload` part of a product save request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sku: String,
    pub department: Department,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub sub_category_id: Option<Uuid>,
    #[serde(default)]
    pub collection_id: Option<Uuid>,
    pub thumbnail: MediaRef,
    #[serde(default)]
    pub images: Vec<MediaRef>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    /// Version the editor started from. Omit for last-write-wins.
    #[serde(default)]
    pub expected_version: Option<i32>,
    #[serde(default)]
    pub variants: Vec<VariantPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VariantPayload {
    /// Server id of an existing row. Absent for rows added in the editor.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Temporary id the editor uses for unsaved rows.
    #[serde(default)]
    pub client_id: Option<String>,
    pub size: VariantSize,
    pub color: String,
    #[serde(deserialize_with = "coerce_i32")]
    #[schema(value_type = i32)]
    pub stock: i32,
    #[serde(default)]
    pub status: Option<StockStatus>,
    #[serde(deserialize_with = "coerce_i64")]
    #[schema(value_type = i64)]
    pub price: i64,
    #[serde(default, deserialize_with = "coerce_opt_i64")]
    #[schema(value_type = Option<i64>)]
    pub discount_price: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image: Option<MediaRef>,
}

/// Media after multipart parts have been matched up with the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaInput {
    Stored(String),
    New(Attachment),
}

/// Scalar product fields as entered in the form.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductForm {
    pub title: String,
    pub description: Option<String>,
    pub sku: String,
    pub department: Department,
    pub material: Option<String>,
    pub category_id: Option<Uuid>,
    pub sub_category_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantSubmission {
    pub id: Option<Uuid>,
    pub client_id: Option<String>,
    pub size: VariantSize,
    pub color: String,
    pub stock: i32,
    pub status: Option<StockStatus>,
    pub price: i64,
    pub discount_price: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub image: Option<MediaInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductSubmission {
    pub form: ProductForm,
    pub thumbnail: MediaInput,
    pub images: Vec<MediaInput>,
    pub variants: Vec<VariantSubmission>,
    pub expected_version: Option<i32>,
}

impl ProductPayload {
    /// Swap every `upload` reference for the matching multipart file.
    pub fn resolve(self, files: &HashMap<String, Attachment>) -> AppResult<ProductSubmission> {
        let thumbnail = resolve_media(self.thumbnail, files)?;
        let images = self
            .images
            .into_iter()
            .map(|media| resolve_media(media, files))
            .collect::<AppResult<Vec<_>>>()?;
        let variants = self
            .variants
            .into_iter()
            .map(|variant| {
                Ok(VariantSubmission {
                    id: variant.id,
                    client_id: variant.client_id,
                    size: variant.size,
                    color: variant.color,
                    stock: variant.stock,
                    status: variant.status,
                    price: variant.price,
                    discount_price: variant.discount_price,
                    expires_at: variant.expires_at,
                    image: variant
                        .image
                        .map(|media| resolve_media(media, files))
                        .transpose()?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ProductSubmission {
            form: ProductForm {
                title: self.title,
                description: self.description,
                sku: self.sku,
                department: self.department,
                material: self.material,
                category_id: self.category_id,
                sub_category_id: self.sub_category_id,
                collection_id: self.collection_id,
                seo_title: self.seo_title,
                seo_description: self.seo_description,
                slug: self.slug,
            },
            thumbnail,
            images,
            variants,
            expected_version: self.expected_version,
        })
    }
}

fn resolve_media(media: MediaRef, files: &HashMap<String, Attachment>) -> AppResult<MediaInput> {
    match media {
        MediaRef::Stored(path) => Ok(MediaInput::Stored(path)),
        MediaRef::Upload(part) => files
            .get(&part)
            .cloned()
            .map(MediaInput::New)
            .ok_or_else(|| AppError::BadRequest(format!("Missing file part `{part}`"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberInput {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberInput {
    fn into_i64(self) -> Result<Option<i64>, String> {
        match self {
            NumberInput::Int(n) => Ok(Some(n)),
            // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
            NumberInput::Float(f)
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                Ok(Some(f as i64))
            }
            NumberInput::Float(f) if f.fract() == 0.0 => Err(format!("{f} is out of range")),
            NumberInput::Float(f) => Err(format!("expected a whole number, got {f}")),
            NumberInput::Text(s) if s.trim().is_empty() => Ok(None),
            NumberInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| format!("expected a number, got `{s}`")),
        }
    }
}

fn coerce_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberInput::deserialize(deserializer)?
        .into_i64()
        .map_err(serde::de::Error::custom)?
        .ok_or_else(|| serde::de::Error::custom("expected a number, got an empty value"))
}

fn coerce_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = coerce_i64(deserializer)?;
    i32::try_from(value).map_err(|_| serde::de::Error::custom(format!("{value} is out of range")))
}

fn coerce_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberInput>::deserialize(deserializer)? {
        Some(input) => input.into_i64().map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariantView {
    #[serde(flatten)]
    pub variant: ProductVariant,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub thumbnail_url: String,
    pub image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantView>>,
}

impl ProductView {
    pub fn new<M: MediaStorage>(
        media: &M,
        product: Product,
        variants: Option<Vec<ProductVariant>>,
    ) -> Self {
        let thumbnail_url = media.public_url(&product.thumbnail);
        let image_urls = product.images.iter().map(|p| media.public_url(p)).collect();
        let variants = variants.map(|variants| {
            variants
                .into_iter()
                .map(|variant| VariantView {
                    image_url: variant.image.as_deref().map(|p| media.public_url(p)),
                    variant,
                })
                .collect()
        });
        Self {
            product,
            thumbnail_url,
            image_urls,
            variants,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SavedProduct {
    pub product: ProductView,
    pub created: bool,
    /// Server ids assigned to rows that were submitted with a client id.
    pub client_ids: BTreeMap<String, Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<ProductView>)]
    pub items: Vec<ProductView>,
}
