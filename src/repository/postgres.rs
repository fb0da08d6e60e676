use anyhow::anyhow;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::LockType;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{CatalogRepository, CatalogTx, ProductFields, ProductListQuery, VariantFields};
use crate::{
    entity::{
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
            Model as VariantModel,
        },
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    models::{Product, ProductVariant, UnknownVariant},
    routes::params::{ProductSortBy, SortOrder},
};

#[derive(Clone)]
pub struct PgCatalogRepository {
    orm: DatabaseConnection,
}

impl PgCatalogRepository {
    pub fn new(orm: DatabaseConnection) -> Self {
        Self { orm }
    }
}

pub struct PgCatalogTx {
    txn: DatabaseTransaction,
}

impl CatalogRepository for PgCatalogRepository {
    type Tx = PgCatalogTx;

    async fn begin(&self) -> AppResult<PgCatalogTx> {
        Ok(PgCatalogTx {
            txn: self.orm.begin().await?,
        })
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Products::find_by_id(id)
            .one(&self.orm)
            .await?
            .map(product_from_entity)
            .transpose()
    }

    async fn list_variants(&self, product_id: Uuid) -> AppResult<Vec<ProductVariant>> {
        ProductVariants::find()
            .filter(VariantCol::ProductId.eq(product_id))
            .order_by_asc(VariantCol::CreatedAt)
            .order_by_asc(VariantCol::Id)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(variant_from_entity)
            .collect()
    }

    async fn list_products(&self, query: ProductListQuery) -> AppResult<(i64, Vec<Product>)> {
        let mut condition = Condition::all();
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            condition = condition.add(
                Condition::any()
                    .add(Expr::col(ProductCol::Title).ilike(pattern.clone()))
                    .add(Expr::col(ProductCol::Sku).ilike(pattern)),
            );
        }

        let sort_col = match query.sort_by {
            ProductSortBy::CreatedAt => ProductCol::CreatedAt,
            ProductSortBy::Title => ProductCol::Title,
        };

        let mut finder = Products::find().filter(condition);
        finder = match query.sort_order {
            SortOrder::Asc => finder.order_by_asc(sort_col),
            SortOrder::Desc => finder.order_by_desc(sort_col),
        };

        let total = finder.clone().count(&self.orm).await? as i64;

        let items = finder
            .limit(query.limit)
            .offset(query.offset)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(product_from_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((total, items))
    }
}

impl CatalogTx for PgCatalogTx {
    async fn lock_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Products::find_by_id(id)
            .lock(LockType::Update)
            .one(&self.txn)
            .await?
            .map(product_from_entity)
            .transpose()
    }

    async fn insert_product(
        &self,
        id: Uuid,
        author_id: Uuid,
        fields: ProductFields,
    ) -> AppResult<Product> {
        let mut active = ProductActive {
            id: Set(id),
            author_id: Set(author_id),
            version: Set(1),
            created_at: NotSet,
            updated_at: NotSet,
            ..Default::default()
        };
        apply_product_fields(&mut active, fields);
        let model = active.insert(&self.txn).await?;
        product_from_entity(model)
    }

    async fn update_product(&self, id: Uuid, fields: ProductFields) -> AppResult<Product> {
        let existing = Products::find_by_id(id).one(&self.txn).await?;
        let existing = match existing {
            Some(p) => p,
            None => return Err(AppError::NotFound),
        };

        let version = existing.version;
        let mut active: ProductActive = existing.into();
        apply_product_fields(&mut active, fields);
        active.version = Set(version + 1);
        active.updated_at = Set(Utc::now().into());
        let model = active.update(&self.txn).await?;
        product_from_entity(model)
    }

    async fn delete_product(&self, id: Uuid) -> AppResult<u64> {
        let result = Products::delete_by_id(id).exec(&self.txn).await?;
        Ok(result.rows_affected)
    }

    async fn variants(&self, product_id: Uuid) -> AppResult<Vec<ProductVariant>> {
        ProductVariants::find()
            .filter(VariantCol::ProductId.eq(product_id))
            .order_by_asc(VariantCol::CreatedAt)
            .order_by_asc(VariantCol::Id)
            .all(&self.txn)
            .await?
            .into_iter()
            .map(variant_from_entity)
            .collect()
    }

    async fn delete_variants(&self, product_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = ProductVariants::delete_many()
            .filter(VariantCol::ProductId.eq(product_id))
            .filter(VariantCol::Id.is_in(ids.to_vec()))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert_variant(
        &self,
        product_id: Uuid,
        fields: VariantFields,
    ) -> AppResult<ProductVariant> {
        let mut active = VariantActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            created_at: NotSet,
            updated_at: NotSet,
            ..Default::default()
        };
        apply_variant_fields(&mut active, fields);
        let model = active.insert(&self.txn).await?;
        variant_from_entity(model)
    }

    async fn update_variant(&self, id: Uuid, fields: VariantFields) -> AppResult<ProductVariant> {
        let existing = ProductVariants::find_by_id(id).one(&self.txn).await?;
        let existing = match existing {
            Some(v) => v,
            None => return Err(AppError::NotFound),
        };

        let mut active: VariantActive = existing.into();
        apply_variant_fields(&mut active, fields);
        active.updated_at = Set(Utc::now().into());
        let model = active.update(&self.txn).await?;
        variant_from_entity(model)
    }

    async fn commit(self) -> AppResult<()> {
        self.txn.commit().await?;
        Ok(())
    }
}

fn apply_product_fields(active: &mut ProductActive, fields: ProductFields) {
    active.title = Set(fields.title);
    active.description = Set(fields.description);
    active.sku = Set(fields.sku);
    active.department = Set(fields.department.as_str().to_string());
    active.material = Set(fields.material);
    active.category_id = Set(fields.category_id);
    active.sub_category_id = Set(fields.sub_category_id);
    active.collection_id = Set(fields.collection_id);
    active.thumbnail = Set(fields.thumbnail);
    active.images = Set(serde_json::Value::from(fields.images));
    active.seo_title = Set(fields.seo_title);
    active.seo_description = Set(fields.seo_description);
    active.slug = Set(fields.slug);
}

fn apply_variant_fields(active: &mut VariantActive, fields: VariantFields) {
    active.size = Set(fields.size.as_str().to_string());
    active.color = Set(fields.color);
    active.stock = Set(fields.stock);
    active.status = Set(fields.status.as_str().to_string());
    active.price = Set(fields.price);
    active.discount_price = Set(fields.discount_price);
    active.expires_at = Set(fields.expires_at.map(Into::into));
    active.image = Set(fields.image);
}

/// `ILIKE` pattern matching `search` literally anywhere in the value.
/// Postgres uses `\` as the default escape character.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn product_from_entity(model: ProductModel) -> AppResult<Product> {
    let images: Vec<String> = serde_json::from_value(model.images)
        .map_err(|e| AppError::Internal(anyhow!("product {} has malformed images: {e}", model.id)))?;
    Ok(Product {
        id: model.id,
        title: model.title,
        description: model.description,
        sku: model.sku,
        department: model
            .department
            .parse()
            .map_err(|e| AppError::Internal(anyhow!("product {}: {e}", model.id)))?,
        material: model.material,
        category_id: model.category_id,
        sub_category_id: model.sub_category_id,
        collection_id: model.collection_id,
        thumbnail: model.thumbnail,
        images,
        seo_title: model.seo_title,
        seo_description: model.seo_description,
        slug: model.slug,
        author_id: model.author_id,
        version: model.version,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn variant_from_entity(model: VariantModel) -> AppResult<ProductVariant> {
    let id = model.id;
    let invalid = |e: UnknownVariant| AppError::Internal(anyhow!("variant {id}: {e}"));
    Ok(ProductVariant {
        id: model.id,
        product_id: model.product_id,
        size: model.size.parse().map_err(invalid)?,
        color: model.color,
        stock: model.stock,
        status: model.status.parse().map_err(invalid)?,
        price: model.price,
        discount_price: model.discount_price,
        expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
        image: model.image,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_wildcards_are_escaped() {
        assert_eq!(contains_pattern("linen"), "%linen%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }
}
