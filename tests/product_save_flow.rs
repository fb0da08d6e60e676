use std::io::Cursor;

use catalog_admin_api::{
    config::MediaConfig,
    db::{create_orm_conn, run_migrations},
    dto::products::{MediaInput, ProductForm, ProductSubmission, VariantSubmission},
    error::AppError,
    middleware::auth::AuthUser,
    models::{Department, StockStatus, VariantSize},
    repository::{CatalogRepository, PgCatalogRepository},
    services::product_service,
    storage::{Attachment, LocalStorage},
};
use uuid::Uuid;

fn png(name: &str) -> anyhow::Result<Attachment> {
    let img = image::RgbImage::from_pixel(200, 100, image::Rgb([200, 40, 40]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(Attachment::new(Some(name.into()), Some("image/png".into()), bytes))
}

fn variant(color: &str, stock: i32, id: Option<Uuid>) -> VariantSubmission {
    VariantSubmission {
        id,
        client_id: id.is_none().then(|| format!("tmp-{color}")),
        size: VariantSize::M,
        color: color.into(),
        stock,
        status: None,
        price: 4500,
        discount_price: None,
        expires_at: None,
        image: None,
    }
}

// Integration flow: admin creates a product with three variants, then edits it
// so one variant is removed, two are updated and one is added.
#[tokio::test]
async fn create_then_reconcile_variants() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    // Applied versions are recorded, so a second run is a no-op.
    run_migrations(&orm).await?;
    let repo = PgCatalogRepository::new(orm);

    let media_dir = tempfile::tempdir()?;
    let media = LocalStorage::new(media_dir.path(), "http://localhost/media");
    let settings = MediaConfig {
        root: media_dir.path().to_path_buf(),
        ..MediaConfig::default()
    };
    let admin = AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    };

    let form = ProductForm {
        title: "Integration tee".into(),
        description: None,
        sku: format!("IT-{}", Uuid::new_v4().simple()),
        department: Department::Unisex,
        material: Some("cotton".into()),
        category_id: None,
        sub_category_id: None,
        collection_id: None,
        seo_title: None,
        seo_description: None,
        slug: None,
    };

    // Create
    let created = product_service::save_product(
        &repo,
        &media,
        &settings,
        &admin,
        None,
        ProductSubmission {
            form: form.clone(),
            thumbnail: MediaInput::New(png("thumb.png")?),
            images: vec![MediaInput::New(png("front.png")?)],
            variants: vec![variant("a", 10, None), variant("b", 3, None), variant("c", 0, None)],
            expected_version: None,
        },
    )
    .await?
    .data
    .expect("saved product");

    assert!(created.created);
    let product = created.product.product;
    assert_eq!(product.version, 1);
    assert!(product.thumbnail.ends_with(".jpg"));
    assert!(media_dir.path().join(&product.thumbnail).is_file());

    let id_of = |color: &str| created.client_ids[&format!("tmp-{color}")];
    let (a, b, c) = (id_of("a"), id_of("b"), id_of("c"));

    let stored = repo.list_variants(product.id).await?;
    assert_eq!(stored.len(), 3);
    let status_of = |id: Uuid| stored.iter().find(|v| v.id == id).map(|v| v.status);
    assert_eq!(status_of(b), Some(StockStatus::LowStock));
    assert_eq!(status_of(c), Some(StockStatus::OutOfStock));

    // Edit: drop b, update a and c, add d
    let edited = product_service::save_product(
        &repo,
        &media,
        &settings,
        &admin,
        Some(product.id),
        ProductSubmission {
            form: ProductForm {
                title: "Integration tee v2".into(),
                ..form.clone()
            },
            thumbnail: MediaInput::Stored(product.thumbnail.clone()),
            images: product.images.iter().cloned().map(MediaInput::Stored).collect(),
            variants: vec![
                variant("a", 7, Some(a)),
                variant("c", 20, Some(c)),
                variant("d", 1, None),
            ],
            expected_version: Some(1),
        },
    )
    .await?
    .data
    .expect("saved product");

    assert!(!edited.created);
    assert_eq!(edited.product.product.version, 2);
    assert_eq!(edited.product.product.author_id, admin.user_id);

    let stored = repo.list_variants(product.id).await?;
    let ids: Vec<Uuid> = stored.iter().map(|v| v.id).collect();
    assert_eq!(stored.len(), 3);
    assert!(ids.contains(&a) && ids.contains(&c));
    assert!(!ids.contains(&b));
    assert!(stored.iter().any(|v| v.color == "d"));

    // A stale editor is rejected
    let stale = product_service::save_product(
        &repo,
        &media,
        &settings,
        &admin,
        Some(product.id),
        ProductSubmission {
            form,
            thumbnail: MediaInput::Stored(product.thumbnail.clone()),
            images: Vec::new(),
            variants: Vec::new(),
            expected_version: Some(1),
        },
    )
    .await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));

    product_service::delete_product(&repo, &media, &admin, product.id).await?;
    assert!(repo.find_product(product.id).await?.is_none());
    assert!(repo.list_variants(product.id).await?.is_empty());
    assert!(!media_dir.path().join(&product.thumbnail).exists());

    Ok(())
}
