//! Table access for products and their variants.
//!
//! Reads go straight through [`CatalogRepository`]. Every write happens inside
//! a [`CatalogTx`]; dropping a transaction without calling
//! [`CatalogTx::commit`] discards its writes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Department, Product, ProductVariant, StockStatus, VariantSize},
    routes::params::{ProductSortBy, SortOrder},
};

pub mod postgres;
#[cfg(test)]
pub mod test;

pub use postgres::PgCatalogRepository;

/// Product columns written by a save. `author_id` is deliberately absent: it
/// is only ever set by [`CatalogTx::insert_product`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
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
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantFields {
    pub size: VariantSize,
    pub color: String,
    pub stock: i32,
    pub status: StockStatus,
    pub price: i64,
    pub discount_price: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub sort_by: ProductSortBy,
    pub sort_order: SortOrder,
    pub limit: u64,
    pub offset: u64,
}

pub trait CatalogRepository: Send + Sync {
    type Tx: CatalogTx;

    fn begin(&self) -> impl Future<Output = AppResult<Self::Tx>> + Send;

    fn find_product(&self, id: Uuid) -> impl Future<Output = AppResult<Option<Product>>> + Send;

    /// Variants of a product, oldest first.
    fn list_variants(
        &self,
        product_id: Uuid,
    ) -> impl Future<Output = AppResult<Vec<ProductVariant>>> + Send;

    /// Returns the total match count alongside the requested page.
    fn list_products(
        &self,
        query: ProductListQuery,
    ) -> impl Future<Output = AppResult<(i64, Vec<Product>)>> + Send;
}

pub trait CatalogTx: Send + Sync {
    /// Load a product and hold it against concurrent writers until commit.
    fn lock_product(&self, id: Uuid) -> impl Future<Output = AppResult<Option<Product>>> + Send;

    fn insert_product(
        &self,
        id: Uuid,
        author_id: Uuid,
        fields: ProductFields,
    ) -> impl Future<Output = AppResult<Product>> + Send;

    /// Overwrite the product's columns and bump its version.
    fn update_product(
        &self,
        id: Uuid,
        fields: ProductFields,
    ) -> impl Future<Output = AppResult<Product>> + Send;

    fn delete_product(&self, id: Uuid) -> impl Future<Output = AppResult<u64>> + Send;

    fn variants(
        &self,
        product_id: Uuid,
    ) -> impl Future<Output = AppResult<Vec<ProductVariant>>> + Send;

    fn delete_variants(
        &self,
        product_id: Uuid,
        ids: &[Uuid],
    ) -> impl Future<Output = AppResult<u64>> + Send;

    fn insert_variant(
        &self,
        product_id: Uuid,
        fields: VariantFields,
    ) -> impl Future<Output = AppResult<ProductVariant>> + Send;

    fn update_variant(
        &self,
        id: Uuid,
        fields: VariantFields,
    ) -> impl Future<Output = AppResult<ProductVariant>> + Send;

    fn commit(self) -> impl Future<Output = AppResult<()>> + Send;
}
