use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::Utc;
use uuid::Uuid;

use super::{CatalogRepository, CatalogTx, ProductFields, ProductListQuery, VariantFields};
use crate::{
    error::{AppError, AppResult},
    models::{Product, ProductVariant},
    routes::params::{ProductSortBy, SortOrder},
};

/// Every repository call the in-memory catalog has seen, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LockProduct(Uuid),
    InsertProduct(Uuid),
    UpdateProduct(Uuid),
    DeleteProduct(Uuid),
    Variants(Uuid),
    DeleteVariants(Vec<Uuid>),
    InsertVariant(String),
    UpdateVariant(Uuid),
    Commit,
}

impl Call {
    pub fn touches_variants(&self) -> bool {
        matches!(
            self,
            Call::Variants(_)
                | Call::DeleteVariants(_)
                | Call::InsertVariant(_)
                | Call::UpdateVariant(_)
        )
    }
}

#[derive(Default, Clone)]
struct State {
    products: BTreeMap<Uuid, Product>,
    variants: Vec<ProductVariant>,
}

#[derive(Default)]
struct Failures {
    product_writes: bool,
    variant_update: Option<Uuid>,
    variant_insert_color: Option<String>,
}

/// Simple in-memory repository used for unit tests. Transactions work on a
/// copy of the state that only replaces the shared state on commit.
#[derive(Default, Clone)]
pub struct TestCatalog {
    state: Arc<Mutex<State>>,
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<Failures>>,
}

impl TestCatalog {
    pub fn seed(&self, product: Product, variants: Vec<ProductVariant>) {
        let mut state = self.state.lock().unwrap();
        state.products.insert(product.id, product);
        state.variants.extend(variants);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn product(&self, id: Uuid) -> Option<Product> {
        self.state.lock().unwrap().products.get(&id).cloned()
    }

    pub fn variants_of(&self, product_id: Uuid) -> Vec<ProductVariant> {
        self.state
            .lock()
            .unwrap()
            .variants
            .iter()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn product_count(&self) -> usize {
        self.state.lock().unwrap().products.len()
    }

    pub fn fail_product_writes(&self) {
        self.failures.lock().unwrap().product_writes = true;
    }

    pub fn fail_variant_update(&self, id: Uuid) {
        self.failures.lock().unwrap().variant_update = Some(id);
    }

    pub fn fail_variant_insert(&self, color: &str) {
        self.failures.lock().unwrap().variant_insert_color = Some(color.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct TestTx {
    catalog: TestCatalog,
    working: Mutex<State>,
}

impl TestTx {
    fn record(&self, call: Call) {
        self.catalog.record(call);
    }
}

fn injected(what: &str) -> AppError {
    AppError::Internal(anyhow!("injected {what} failure"))
}

impl CatalogRepository for TestCatalog {
    type Tx = TestTx;

    async fn begin(&self) -> AppResult<TestTx> {
        let snapshot = self.state.lock().unwrap().clone();
        Ok(TestTx {
            catalog: self.clone(),
            working: Mutex::new(snapshot),
        })
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.product(id))
    }

    async fn list_variants(&self, product_id: Uuid) -> AppResult<Vec<ProductVariant>> {
        Ok(self.variants_of(product_id))
    }

    async fn list_products(&self, query: ProductListQuery) -> AppResult<(i64, Vec<Product>)> {
        let mut items: Vec<Product> = self.state.lock().unwrap().products.values().cloned().collect();
        if let Some(search) = query.search {
            let search = search.to_lowercase();
            items.retain(|p| {
                p.title.to_lowercase().contains(&search) || p.sku.to_lowercase().contains(&search)
            });
        }
        match query.sort_by {
            ProductSortBy::CreatedAt => items.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            ProductSortBy::Title => items.sort_by(|a, b| a.title.cmp(&b.title)),
        }
        if let SortOrder::Desc = query.sort_order {
            items.reverse();
        }
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok((total, items))
    }
}

impl CatalogTx for TestTx {
    async fn lock_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        self.record(Call::LockProduct(id));
        Ok(self.working.lock().unwrap().products.get(&id).cloned())
    }

    async fn insert_product(
        &self,
        id: Uuid,
        author_id: Uuid,
        fields: ProductFields,
    ) -> AppResult<Product> {
        self.record(Call::InsertProduct(id));
        if self.catalog.failures.lock().unwrap().product_writes {
            return Err(injected("product insert"));
        }
        let now = Utc::now();
        let product = Product {
            id,
            title: fields.title,
            description: fields.description,
            sku: fields.sku,
            department: fields.department,
            material: fields.material,
            category_id: fields.category_id,
            sub_category_id: fields.sub_category_id,
            collection_id: fields.collection_id,
            thumbnail: fields.thumbnail,
            images: fields.images,
            seo_title: fields.seo_title,
            seo_description: fields.seo_description,
            slug: fields.slug,
            author_id,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.working
            .lock()
            .unwrap()
            .products
            .insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, fields: ProductFields) -> AppResult<Product> {
        self.record(Call::UpdateProduct(id));
        if self.catalog.failures.lock().unwrap().product_writes {
            return Err(injected("product update"));
        }
        let mut state = self.working.lock().unwrap();
        let product = state.products.get_mut(&id).ok_or(AppError::NotFound)?;
        product.title = fields.title;
        product.description = fields.description;
        product.sku = fields.sku;
        product.department = fields.department;
        product.material = fields.material;
        product.category_id = fields.category_id;
        product.sub_category_id = fields.sub_category_id;
        product.collection_id = fields.collection_id;
        product.thumbnail = fields.thumbnail;
        product.images = fields.images;
        product.seo_title = fields.seo_title;
        product.seo_description = fields.seo_description;
        product.slug = fields.slug;
        product.version += 1;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> AppResult<u64> {
        self.record(Call::DeleteProduct(id));
        let mut state = self.working.lock().unwrap();
        let removed = state.products.remove(&id).is_some();
        state.variants.retain(|v| v.product_id != id);
        Ok(u64::from(removed))
    }

    async fn variants(&self, product_id: Uuid) -> AppResult<Vec<ProductVariant>> {
        self.record(Call::Variants(product_id));
        Ok(self
            .working
            .lock()
            .unwrap()
            .variants
            .iter()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn delete_variants(&self, product_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        self.record(Call::DeleteVariants(ids.to_vec()));
        let mut state = self.working.lock().unwrap();
        let before = state.variants.len();
        state
            .variants
            .retain(|v| !(v.product_id == product_id && ids.contains(&v.id)));
        Ok((before - state.variants.len()) as u64)
    }

    async fn insert_variant(
        &self,
        product_id: Uuid,
        fields: VariantFields,
    ) -> AppResult<ProductVariant> {
        self.record(Call::InsertVariant(fields.color.clone()));
        let failing = self.catalog.failures.lock().unwrap().variant_insert_color.clone();
        if failing.as_deref() == Some(fields.color.as_str()) {
            return Err(injected("variant insert"));
        }
        let mut state = self.working.lock().unwrap();
        if !state.products.contains_key(&product_id) {
            return Err(AppError::Internal(anyhow!("variant references missing product")));
        }
        let now = Utc::now();
        let variant = ProductVariant {
            id: Uuid::new_v4(),
            product_id,
            size: fields.size,
            color: fields.color,
            stock: fields.stock,
            status: fields.status,
            price: fields.price,
            discount_price: fields.discount_price,
            expires_at: fields.expires_at,
            image: fields.image,
            created_at: now,
            updated_at: now,
        };
        state.variants.push(variant.clone());
        Ok(variant)
    }

    async fn update_variant(&self, id: Uuid, fields: VariantFields) -> AppResult<ProductVariant> {
        self.record(Call::UpdateVariant(id));
        if self.catalog.failures.lock().unwrap().variant_update == Some(id) {
            return Err(injected("variant update"));
        }
        let mut state = self.working.lock().unwrap();
        let variant = state
            .variants
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(AppError::NotFound)?;
        variant.size = fields.size;
        variant.color = fields.color;
        variant.stock = fields.stock;
        variant.status = fields.status;
        variant.price = fields.price;
        variant.discount_price = fields.discount_price;
        variant.expires_at = fields.expires_at;
        variant.image = fields.image;
        variant.updated_at = Utc::now();
        Ok(variant.clone())
    }

    async fn commit(self) -> AppResult<()> {
        self.record(Call::Commit);
        let working = self.working.into_inner().unwrap();
        *self.catalog.state.lock().unwrap() = working;
        Ok(())
    }
}
