use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{ProductList, ProductPayload, ProductSubmission, ProductView, SavedProduct},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::ProductQuery,
    services::product_service,
    state::AppState,
    storage::Attachment,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search title or SKU"),
        ("sort_by" = Option<String>, Query, description = "Sort by: created_at, title"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc"),
    ),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>)
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_products(&state.catalog, &state.media, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product with its variants", body = ApiResponse<ProductView>),
        (status = 404, description = "Product not found"),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductView>>> {
    let resp = product_service::get_product(&state.catalog, &state.media, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body(
        content = ProductPayload,
        content_type = "multipart/form-data",
        description = "`payload` JSON part plus one part per file referenced by an `upload` slot"
    ),
    responses(
        (status = 200, description = "Product created", body = ApiResponse<SavedProduct>),
        (status = 400, description = "Invalid submission"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<SavedProduct>>> {
    let submission = read_submission(multipart, state.config.media.max_upload_bytes).await?;
    let resp = product_service::save_product(
        &state.catalog,
        &state.media,
        &state.config.media,
        &user,
        None,
        submission,
    )
    .await?;

    if let Some(saved) = &resp.data {
        audit::record(
            state.orm.get_postgres_connection_pool(),
            user.user_id,
            "product_create",
            serde_json::json!({ "product_id": saved.product.product.id }),
        )
        .await;
    }
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body(
        content = ProductPayload,
        content_type = "multipart/form-data",
        description = "`payload` JSON part plus one part per file referenced by an `upload` slot"
    ),
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<SavedProduct>),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product changed since `expected_version`"),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<SavedProduct>>> {
    let submission = read_submission(multipart, state.config.media.max_upload_bytes).await?;
    let resp = product_service::save_product(
        &state.catalog,
        &state.media,
        &state.config.media,
        &user,
        Some(id),
        submission,
    )
    .await?;

    audit::record(
        state.orm.get_postgres_connection_pool(),
        user.user_id,
        "product_update",
        serde_json::json!({ "product_id": id }),
    )
    .await;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Deleted product"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_product(&state.catalog, &state.media, &user, id).await?;

    audit::record(
        state.orm.get_postgres_connection_pool(),
        user.user_id,
        "product_delete",
        serde_json::json!({ "product_id": id }),
    )
    .await;
    Ok(Json(resp))
}

async fn read_submission(mut multipart: Multipart, max_bytes: usize) -> AppResult<ProductSubmission> {
    let mut payload: Option<ProductPayload> = None;
    let mut files: HashMap<String, Attachment> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart request: {e}")))?
    {
        let name = field.name().map(str::to_string).unwrap_or_default();
        if name == "payload" {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
            let parsed = serde_json::from_str(&text)
                .map_err(|e| AppError::BadRequest(format!("Invalid payload: {e}")))?;
            payload = Some(parsed);
            continue;
        }
        if name.is_empty() {
            return Err(AppError::BadRequest("File part without a name".into()));
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest(format!("File part `{name}` is empty")));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File part `{name}` exceeds {max_bytes} bytes"
            )));
        }
        files.insert(name, Attachment::new(file_name, content_type, bytes.to_vec()));
    }

    let payload = payload.ok_or_else(|| AppError::BadRequest("Missing `payload` part".into()))?;
    payload.resolve(&files)
}
