//! Catalog product and product-image link repository.

use crate::error::MetadataResult;
use crate::models::{ProductImageRow, ProductRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for catalog products and their image links.
#[async_trait]
pub trait ProductRepo: Send + Sync {
    /// Create a product. The catalog CRUD surface is external; this exists
    /// for bootstrap and tests.
    async fn create_product(
        &self,
        sku: &str,
        name: Option<&str>,
        now: OffsetDateTime,
    ) -> MetadataResult<ProductRow>;

    /// Resolve a product by its business key.
    async fn get_product_by_sku(&self, sku: &str) -> MetadataResult<Option<ProductRow>>;

    /// Get a product by id.
    async fn get_product(&self, id: i64) -> MetadataResult<Option<ProductRow>>;

    /// List the image links of a product.
    async fn list_product_images(&self, product_id: i64) -> MetadataResult<Vec<ProductImageRow>>;

    /// Link an image to a product, enforcing the primary-image invariant.
    ///
    /// Runs in one transaction. If the link already exists it is updated in
    /// place. When `is_primary` is requested, all other primary flags for the
    /// product are cleared and the product's `primary_image_id` is set in
    /// the same transaction; at most one link per product ever has the flag.
    async fn attach_image(
        &self,
        product_id: i64,
        image_id: i64,
        is_primary: bool,
        now: OffsetDateTime,
    ) -> MetadataResult<ProductImageRow>;
}
