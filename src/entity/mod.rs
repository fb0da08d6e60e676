pub mod product_variants;
pub mod products;

pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
