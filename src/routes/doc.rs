use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::products::{
        MediaRef, ProductList, ProductPayload, ProductView, SavedProduct, VariantPayload,
        VariantView,
    },
    models::{Department, Product, ProductVariant, StockStatus, VariantSize},
    response::{ApiResponse, Meta},
    routes::{health, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product
    ),
    components(
        schemas(
            Product,
            ProductVariant,
            Department,
            VariantSize,
            StockStatus,
            MediaRef,
            ProductPayload,
            VariantPayload,
            ProductView,
            VariantView,
            SavedProduct,
            ProductList,
            params::ProductQuery,
            params::ProductSortBy,
            params::SortOrder,
            Meta,
            ApiResponse<ProductView>,
            ApiResponse<SavedProduct>,
            ApiResponse<ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "products", description = "Catalog product administration"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
