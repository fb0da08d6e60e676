use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::anyhow;
use futures::future::try_join_all;
use uuid::Uuid;

use crate::{
    config::MediaConfig,
    dto::products::{
        MediaInput, ProductList, ProductSubmission, ProductView, SavedProduct, VariantSubmission,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductVariant, StockStatus},
    repository::{CatalogRepository, CatalogTx, ProductFields, ProductListQuery, VariantFields},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::reconcile::{VariantWrite, plan_variant_sync},
    storage::{
        Attachment, MediaStorage, UploadSession, image::compress_thumbnail,
        product_media_key, remove_best_effort, variant_media_key,
    },
};

pub async fn list_products<R, M>(
    repo: &R,
    media: &M,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>>
where
    R: CatalogRepository,
    M: MediaStorage,
{
    let (page, limit, offset) = query.pagination().normalize();
    let (total, products) = repo
        .list_products(ProductListQuery {
            search: query
                .q
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            sort_by: query.sort_by.unwrap_or(ProductSortBy::CreatedAt),
            sort_order: query.sort_order.unwrap_or(SortOrder::Desc),
            limit: limit as u64,
            offset: offset as u64,
        })
        .await?;

    let items = products
        .into_iter()
        .map(|product| ProductView::new(media, product, None))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product<R, M>(repo: &R, media: &M, id: Uuid) -> AppResult<ApiResponse<ProductView>>
where
    R: CatalogRepository,
    M: MediaStorage,
{
    let product = match repo.find_product(id).await? {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    let variants = repo.list_variants(id).await?;
    Ok(ApiResponse::success(
        "Product",
        ProductView::new(media, product, Some(variants)),
        None,
    ))
}

/// Create (`product_id == None`) or edit a product together with its variants.
///
/// New media is uploaded first, then the product row and the whole variant
/// set are written in one transaction. If anything fails, the transaction is
/// rolled back and every object uploaded by this call is removed again.
pub async fn save_product<R, M>(
    repo: &R,
    media: &M,
    settings: &MediaConfig,
    user: &AuthUser,
    product_id: Option<Uuid>,
    submission: ProductSubmission,
) -> AppResult<ApiResponse<SavedProduct>>
where
    R: CatalogRepository,
    M: MediaStorage,
{
    ensure_admin(user)?;
    validate_submission(&submission)?;

    let stored_refs = stored_refs(&submission);
    let (id, base) = match product_id {
        Some(id) => {
            let existing = match repo.find_product(id).await? {
                Some(p) => p,
                None => return Err(AppError::NotFound),
            };
            check_version(&existing, submission.expected_version)?;
            let variants = repo.list_variants(id).await?;
            check_stored_paths(&stored_refs, &referenced_paths(&existing, &variants))?;
            let base = EditBase {
                version: existing.version,
                stored_refs,
            };
            (id, Some(base))
        }
        None => {
            if submission.expected_version.is_some() {
                return Err(AppError::BadRequest(
                    "expected_version only applies to existing products".into(),
                ));
            }
            // A new product has no stored media to point at.
            check_stored_paths(&stored_refs, &BTreeSet::new())?;
            (Uuid::new_v4(), None)
        }
    };

    let mut uploads = UploadSession::new(media);
    let outcome = persist(repo, &mut uploads, settings, user, id, base, submission).await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(product_id = %id, error = %err, "product save failed");
            uploads.rollback().await;
            return Err(err);
        }
    };
    let uploaded = uploads.finish();

    if !outcome.orphaned.is_empty() {
        tracing::debug!(product_id = %id, objects = outcome.orphaned.len(), "removing replaced media");
        remove_best_effort(media, &outcome.orphaned).await;
    }

    tracing::info!(
        product_id = %id,
        created = !outcome.updated,
        variants = outcome.variants.len(),
        uploads = uploaded.len(),
        "product saved"
    );

    let message = if outcome.updated {
        "Product updated"
    } else {
        "Product created"
    };
    Ok(ApiResponse::success(
        message,
        SavedProduct {
            product: ProductView::new(media, outcome.product, Some(outcome.variants)),
            created: !outcome.updated,
            client_ids: outcome.client_ids,
        },
        Some(Meta::empty()),
    ))
}

pub async fn delete_product<R, M>(
    repo: &R,
    media: &M,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>>
where
    R: CatalogRepository,
    M: MediaStorage,
{
    ensure_admin(user)?;

    let tx = repo.begin().await?;
    let product = match tx.lock_product(id).await? {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    let variants = tx.variants(id).await?;
    if tx.delete_product(id).await? == 0 {
        return Err(AppError::NotFound);
    }
    tx.commit().await?;

    let stored = referenced_paths(&product, &variants);
    remove_best_effort(media, &stored.into_iter().collect::<Vec<_>>()).await;

    tracing::info!(product_id = %id, variants = variants.len(), "product deleted");
    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

struct SaveOutcome {
    product: Product,
    variants: Vec<ProductVariant>,
    client_ids: BTreeMap<String, Uuid>,
    orphaned: Vec<String>,
    updated: bool,
}

/// The product state an edit was validated against before uploading.
struct EditBase {
    version: i32,
    stored_refs: Vec<String>,
}

struct PreparedVariant {
    id: Option<Uuid>,
    client_id: Option<String>,
    fields: VariantFields,
}

async fn persist<R, M>(
    repo: &R,
    uploads: &mut UploadSession<M>,
    settings: &MediaConfig,
    user: &AuthUser,
    id: Uuid,
    base: Option<EditBase>,
    submission: ProductSubmission,
) -> AppResult<SaveOutcome>
where
    R: CatalogRepository,
    M: MediaStorage,
{
    let ProductSubmission {
        form,
        thumbnail,
        images,
        variants,
        expected_version,
    } = submission;
    let updating = base.is_some();

    let thumbnail = match thumbnail {
        MediaInput::Stored(path) => path,
        MediaInput::New(file) => {
            let compressed = compress(file, settings).await?;
            uploads
                .put(product_media_key(id, "jpg"), compressed)
                .await?
        }
    };

    let images = store_images(uploads, id, images).await?;

    let mut prepared = Vec::with_capacity(variants.len());
    for variant in variants {
        prepared.push(prepare_variant(uploads, id, variant).await?);
    }

    let fields = ProductFields {
        title: form.title.trim().to_string(),
        description: form.description,
        sku: form.sku.trim().to_string(),
        department: form.department,
        material: form.material,
        category_id: form.category_id,
        sub_category_id: form.sub_category_id,
        collection_id: form.collection_id,
        thumbnail,
        images,
        seo_title: form.seo_title,
        seo_description: form.seo_description,
        slug: form.slug,
    };

    let tx = repo.begin().await?;

    let (product, previous) = if let Some(base) = &base {
        let current = match tx.lock_product(id).await? {
            Some(p) => p,
            None => return Err(AppError::NotFound),
        };
        check_version(&current, expected_version)?;
        if current.version != base.version {
            // Changed since the stored paths were checked.
            let variants = tx.variants(id).await?;
            check_stored_paths(&base.stored_refs, &referenced_paths(&current, &variants))?;
        }
        (tx.update_product(id, fields).await?, Some(current))
    } else {
        (tx.insert_product(id, user.user_id, fields).await?, None)
    };

    let existing = if updating {
        tx.variants(id).await?
    } else {
        Vec::new()
    };
    let existing_ids: BTreeSet<Uuid> = existing.iter().map(|v| v.id).collect();

    let plan = plan_variant_sync(
        &existing_ids,
        prepared
            .into_iter()
            .map(|v| (v.id, (v.client_id, v.fields)))
            .collect(),
    );
    tracing::debug!(
        product_id = %id,
        delete = plan.delete.len(),
        update = plan.update_count(),
        insert = plan.insert_count(),
        "variant sync plan"
    );

    tx.delete_variants(id, &plan.delete).await?;

    let tx_ref = &tx;
    let written = try_join_all(plan.writes.into_iter().map(|write| async move {
        match write {
            VariantWrite::Update {
                id: variant_id,
                variant: (_, fields),
            } => tx_ref
                .update_variant(variant_id, fields)
                .await
                .map(|v| (None, v)),
            VariantWrite::Insert {
                variant: (client_id, fields),
            } => tx_ref
                .insert_variant(id, fields)
                .await
                .map(|v| (client_id, v)),
        }
    }))
    .await?;

    tx.commit().await?;

    let mut client_ids = BTreeMap::new();
    let mut saved = Vec::with_capacity(written.len());
    for (client_id, variant) in written {
        if let Some(client_id) = client_id {
            client_ids.insert(client_id, variant.id);
        }
        saved.push(variant);
    }

    let orphaned = match previous {
        Some(previous) => {
            let still_used = referenced_paths(&product, &saved);
            referenced_paths(&previous, &existing)
                .into_iter()
                .filter(|path| !still_used.contains(path))
                .collect()
        }
        None => Vec::new(),
    };

    Ok(SaveOutcome {
        product,
        variants: saved,
        client_ids,
        orphaned,
        updated: updating,
    })
}

/// Existing paths keep their submitted order and come first; new uploads follow
/// in submission order.
async fn store_images<M: MediaStorage>(
    uploads: &mut UploadSession<M>,
    product_id: Uuid,
    images: Vec<MediaInput>,
) -> AppResult<Vec<String>> {
    let (mut paths, new_files): (Vec<String>, Vec<Attachment>) =
        images
            .into_iter()
            .fold((Vec::new(), Vec::new()), |(mut stored, mut new), media| {
                match media {
                    MediaInput::Stored(path) => stored.push(path),
                    MediaInput::New(file) => new.push(file),
                }
                (stored, new)
            });

    for file in new_files {
        let key = product_media_key(product_id, &file.extension());
        paths.push(uploads.put(key, file).await?);
    }
    Ok(paths)
}

async fn prepare_variant<M: MediaStorage>(
    uploads: &mut UploadSession<M>,
    product_id: Uuid,
    variant: VariantSubmission,
) -> AppResult<PreparedVariant> {
    let image = match variant.image {
        Some(MediaInput::Stored(path)) => Some(path),
        Some(MediaInput::New(file)) => {
            let key = variant_media_key(product_id, &file.extension());
            Some(uploads.put(key, file).await?)
        }
        None => None,
    };

    Ok(PreparedVariant {
        id: variant.id,
        client_id: variant.client_id,
        fields: VariantFields {
            size: variant.size,
            color: variant.color.trim().to_string(),
            stock: variant.stock,
            status: variant
                .status
                .unwrap_or_else(|| StockStatus::from_stock(variant.stock)),
            price: variant.price,
            discount_price: variant.discount_price,
            expires_at: variant.expires_at,
            image,
        },
    })
}

async fn compress(file: Attachment, settings: &MediaConfig) -> AppResult<Attachment> {
    let max_edge = settings.thumbnail_max_edge;
    let quality = settings.thumbnail_quality;
    let bytes = tokio::task::spawn_blocking(move || {
        compress_thumbnail(&file.bytes, max_edge, quality)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow!("thumbnail task failed: {e}")))?
    .map_err(|e| AppError::BadRequest(format!("Invalid thumbnail image: {e}")))?;

    Ok(Attachment::new(None, Some("image/jpeg".into()), bytes))
}

fn validate_submission(submission: &ProductSubmission) -> AppResult<()> {
    let form = &submission.form;
    if form.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    if form.sku.trim().is_empty() {
        return Err(AppError::BadRequest("SKU is required".into()));
    }
    if matches!(&submission.thumbnail, MediaInput::Stored(path) if path.trim().is_empty()) {
        return Err(AppError::BadRequest("Thumbnail is required".into()));
    }

    let mut ids = HashSet::new();
    let mut client_ids = HashSet::new();
    for (index, variant) in submission.variants.iter().enumerate() {
        let row = index + 1;
        if variant.color.trim().is_empty() {
            return Err(AppError::BadRequest(format!("Variant {row}: color is required")));
        }
        if variant.stock < 0 {
            return Err(AppError::BadRequest(format!(
                "Variant {row}: stock cannot be negative"
            )));
        }
        if variant.price < 0 {
            return Err(AppError::BadRequest(format!(
                "Variant {row}: price cannot be negative"
            )));
        }
        if let Some(discount) = variant.discount_price {
            if discount < 0 || discount > variant.price {
                return Err(AppError::BadRequest(format!(
                    "Variant {row}: discount price must be between 0 and the price"
                )));
            }
        }
        if let Some(id) = variant.id {
            if !ids.insert(id) {
                return Err(AppError::BadRequest(format!(
                    "Variant {id} is submitted more than once"
                )));
            }
        }
        if let Some(client_id) = variant.client_id.as_deref() {
            if !client_ids.insert(client_id) {
                return Err(AppError::BadRequest(format!(
                    "Client id `{client_id}` is submitted more than once"
                )));
            }
        }
    }
    Ok(())
}

fn check_version(current: &Product, expected: Option<i32>) -> AppResult<()> {
    match expected {
        Some(expected) if expected != current.version => Err(AppError::Conflict(format!(
            "product was modified (version {} is newer than {expected})",
            current.version
        ))),
        _ => Ok(()),
    }
}

/// Every already-stored path the submission points at.
fn stored_refs(submission: &ProductSubmission) -> Vec<String> {
    std::iter::once(&submission.thumbnail)
        .chain(submission.images.iter())
        .chain(submission.variants.iter().filter_map(|v| v.image.as_ref()))
        .filter_map(|media| match media {
            MediaInput::Stored(path) => Some(path.clone()),
            MediaInput::New(_) => None,
        })
        .collect()
}

/// Stored references may only point at objects the product currently uses.
fn check_stored_paths(stored: &[String], referenced: &BTreeSet<String>) -> AppResult<()> {
    match stored.iter().find(|path| !referenced.contains(path.as_str())) {
        Some(path) => Err(AppError::BadRequest(format!(
            "`{path}` is not stored media of this product"
        ))),
        None => Ok(()),
    }
}

fn referenced_paths(product: &Product, variants: &[ProductVariant]) -> BTreeSet<String> {
    product
        .media_paths()
        .map(str::to_string)
        .chain(variants.iter().filter_map(|v| v.image.clone()))
        .collect()
}
