use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Men,
    Women,
    Kids,
    Unisex,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Men => "men",
            Department::Women => "women",
            Department::Kids => "kids",
            Department::Unisex => "unisex",
        }
    }
}

impl FromStr for Department {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "men" => Ok(Department::Men),
            "women" => Ok(Department::Women),
            "kids" => Ok(Department::Kids),
            "unisex" => Ok(Department::Unisex),
            other => Err(UnknownVariant::new("department", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VariantSize {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
    FreeSize,
}

impl VariantSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantSize::Xs => "xs",
            VariantSize::S => "s",
            VariantSize::M => "m",
            VariantSize::L => "l",
            VariantSize::Xl => "xl",
            VariantSize::Xxl => "xxl",
            VariantSize::FreeSize => "free_size",
        }
    }
}

impl FromStr for VariantSize {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xs" => Ok(VariantSize::Xs),
            "s" => Ok(VariantSize::S),
            "m" => Ok(VariantSize::M),
            "l" => Ok(VariantSize::L),
            "xl" => Ok(VariantSize::Xl),
            "xxl" => Ok(VariantSize::Xxl),
            "free_size" => Ok(VariantSize::FreeSize),
            other => Err(UnknownVariant::new("size", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub const LOW_STOCK_THRESHOLD: i32 = 5;

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    /// Status used when the form leaves it blank.
    pub fn from_stock(stock: i32) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= Self::LOW_STOCK_THRESHOLD {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

impl FromStr for StockStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "low_stock" => Ok(StockStatus::LowStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            other => Err(UnknownVariant::new("status", other)),
        }
    }
}

/// A text column held a value outside its enum's literal set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value `{}`", self.field, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sku: String,
    pub department: Department,
    pub material: Option<String>,
    pub category_id: Option<Uuid>,
    pub sub_category_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub thumbnail: String,
    pub images: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: Option<String>,
    pub author_id: Uuid,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Every storage path the product row points at.
    pub fn media_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.thumbnail.as_str())
            .chain(self.images.iter().map(String::as_str))
            .filter(|path| !path.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: VariantSize,
    pub color: String,
    pub stock: i32,
    pub status: StockStatus,
    pub price: i64,
    pub discount_price: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
