//! One catalog from two product sources.
//!
//! The storefront is authoritative when it returns anything; the local
//! `products` table then only contributes curated fields. When the storefront
//! is empty or unreachable, the local table is the whole catalog.
//!
//! Field ownership when both sources know a product:
//!
//! | Field              | Owner      |
//! |--------------------|------------|
//! | `id`               | storefront |
//! | `name`             | storefront |
//! | `price`            | storefront |
//! | `image_url`        | storefront |
//! | `images`           | storefront |
//! | `variant_id`       | storefront |
//! | `is_active`        | storefront |
//! | `is_hero`          | local      |
//! | `description_html` | local, when non-empty |
//! | `stock_count`      | local      |
//!
//! A local row overlays its storefront product whether or not the row is
//! marked active; `is_active` on local rows only gates the fallback catalog.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use lullwave_core::{CurrencyCode, Price, ProductId, VariantId};

use super::product::{Product, sanitize_html};
use super::storefront::StorefrontApi;
use crate::backend::{BackendClient, BackendError, Order, Query};

/// A row of the local `products` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub stock_count: Option<i32>,
    #[serde(default)]
    pub is_hero: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

impl LocalProduct {
    /// Standalone product for when the storefront has nothing.
    #[must_use]
    pub fn into_product(self) -> Product {
        let currency: CurrencyCode = self
            .currency
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default();
        Product {
            id: self.id,
            name: self.name,
            description_html: sanitize_html(self.description.as_deref().unwrap_or_default()),
            price: Price::new(self.price, currency),
            images: self.image_url.iter().cloned().collect(),
            image_url: self.image_url,
            variant_id: self.variant_id,
            stock_count: self.stock_count,
            is_hero: self.is_hero,
            is_active: self.is_active,
        }
    }
}

/// Source of the curated product overrides.
pub trait LocalCatalog: Send + Sync {
    /// Active products, hero products first.
    fn active_products(
        &self,
    ) -> impl Future<Output = Result<Vec<LocalProduct>, BackendError>> + Send;

    /// Every local row, active or not, for overlaying storefront products.
    fn curated_products(
        &self,
    ) -> impl Future<Output = Result<Vec<LocalProduct>, BackendError>> + Send;
}

impl LocalCatalog for BackendClient {
    async fn active_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
        let query = Query::new()
            .eq("is_active", true)
            .order("is_hero", Order::Desc)
            .order("name", Order::Asc);
        self.select("products", &query).await
    }

    async fn curated_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
        self.select("products", &Query::new()).await
    }
}

/// Overlay local curated fields onto storefront products.
///
/// Storefront order is kept. Local rows without a storefront counterpart are
/// ignored.
#[must_use]
pub fn merge_products(external: Vec<Product>, local: &[LocalProduct]) -> Vec<Product> {
    let by_id: HashMap<&ProductId, &LocalProduct> = local.iter().map(|p| (&p.id, p)).collect();

    external
        .into_iter()
        .map(|mut product| {
            if let Some(curated) = by_id.get(&product.id) {
                product.is_hero = curated.is_hero;
                product.stock_count = curated.stock_count;
                if let Some(description) = curated
                    .description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                {
                    product.description_html = sanitize_html(description);
                }
            }
            product
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The storefront had nothing and the local table couldn't be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(#[from] BackendError),
}

/// Which source the catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Storefront,
    Local,
}

/// The unified product list shown in the shop.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
    source: CatalogSource,
}

impl Catalog {
    /// Fetch the storefront first, then overlay or fall back to local data.
    ///
    /// # Errors
    ///
    /// Returns an error only when the storefront yields nothing and the
    /// local table can't be read either.
    #[instrument(skip_all)]
    pub async fn load<S, L>(storefront: &S, local: &L) -> Result<Self, CatalogError>
    where
        S: StorefrontApi,
        L: LocalCatalog,
    {
        let external = match storefront.list_products().await {
            Ok(products) => products,
            Err(e) => {
                warn!(error = %e, "Storefront unavailable; falling back to local catalog");
                Vec::new()
            }
        };

        if !external.is_empty() {
            let curated = match local.curated_products().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "Local product overrides unavailable");
                    Vec::new()
                }
            };
            debug!(
                count = external.len(),
                curated = curated.len(),
                "Catalog loaded from storefront"
            );
            return Ok(Self {
                products: merge_products(external, &curated),
                source: CatalogSource::Storefront,
            });
        }

        let mut products: Vec<Product> = local
            .active_products()
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .map(LocalProduct::into_product)
            .collect();
        products.sort_by_key(|p| !p.is_hero);
        debug!(count = products.len(), "Catalog loaded from local table");

        Ok(Self {
            products,
            source: CatalogSource::Local,
        })
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub const fn source(&self) -> CatalogSource {
        self.source
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// The featured product: first flagged hero, else the first product.
    #[must_use]
    pub fn hero(&self) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.is_hero)
            .or_else(|| self.products.first())
    }

    #[must_use]
    pub fn find(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::merch::storefront::{CheckoutLine, StorefrontError};

    pub(crate) fn product(id: &str, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Storefront {id}"),
            description_html: "<p>from storefront</p>".to_string(),
            price: Price::new(Decimal::new(price, 2), CurrencyCode::USD),
            image_url: Some(format!("https://cdn.test/{id}.jpg")),
            images: vec![format!("https://cdn.test/{id}.jpg")],
            variant_id: Some(VariantId::new(format!("{id}-v"))),
            stock_count: None,
            is_hero: false,
            is_active: true,
        }
    }

    fn local(id: &str, is_hero: bool, stock: Option<i32>) -> LocalProduct {
        LocalProduct {
            id: ProductId::new(id),
            name: format!("Local {id}"),
            description: Some("<p>curated</p><script>x</script>".to_string()),
            price: Decimal::new(999, 2),
            currency: None,
            image_url: None,
            variant_id: None,
            stock_count: stock,
            is_hero,
            is_active: true,
        }
    }

    struct FakeStorefront(Result<Vec<Product>, u16>);

    impl StorefrontApi for FakeStorefront {
        async fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
            self.0.clone().map_err(|status| StorefrontError::Api {
                status,
                message: "down".to_string(),
            })
        }

        async fn create_checkout(
            &self,
            _lines: &[CheckoutLine],
        ) -> Result<Option<String>, StorefrontError> {
            Ok(None)
        }
    }

    struct FakeLocal(Option<Vec<LocalProduct>>);

    impl LocalCatalog for FakeLocal {
        async fn active_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
            let rows = self.0.clone().ok_or(BackendError::Timeout)?;
            Ok(rows.into_iter().filter(|p| p.is_active).collect())
        }

        async fn curated_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
            self.0.clone().ok_or(BackendError::Timeout)
        }
    }

    #[test]
    fn test_merge_takes_curated_fields_from_local() {
        let merged = merge_products(vec![product("p", 2500)], &[local("p", true, Some(3))]);
        let p = &merged[0];

        assert!(p.is_hero);
        assert_eq!(p.stock_count, Some(3));
        assert_eq!(p.description_html, "<p>curated</p>");
        assert_eq!(p.name, "Storefront p");
        assert_eq!(p.price.amount, Decimal::new(2500, 2));
        assert_eq!(p.images, vec!["https://cdn.test/p.jpg".to_string()]);
    }

    #[test]
    fn test_merge_without_local_row_keeps_storefront() {
        let merged = merge_products(vec![product("a", 100)], &[local("other", true, Some(1))]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_hero);
        assert_eq!(merged[0].description_html, "<p>from storefront</p>");
    }

    #[test]
    fn test_blank_local_description_does_not_override() {
        let mut row = local("p", false, None);
        row.description = Some("   ".to_string());
        let merged = merge_products(vec![product("p", 100)], &[row]);
        assert_eq!(merged[0].description_html, "<p>from storefront</p>");
    }

    #[tokio::test]
    async fn test_load_prefers_storefront() {
        let catalog = Catalog::load(
            &FakeStorefront(Ok(vec![product("a", 100), product("b", 200)])),
            &FakeLocal(Some(vec![local("b", true, Some(3))])),
        )
        .await
        .unwrap();

        assert_eq!(catalog.source(), CatalogSource::Storefront);
        assert_eq!(catalog.products().len(), 2);
        assert_eq!(catalog.hero().unwrap().id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_inactive_local_row_still_overlays_storefront() {
        let mut retired = local("b", true, Some(0));
        retired.is_active = false;
        let catalog = Catalog::load(
            &FakeStorefront(Ok(vec![product("a", 100), product("b", 200)])),
            &FakeLocal(Some(vec![retired])),
        )
        .await
        .unwrap();

        let b = catalog.find(&ProductId::new("b")).unwrap();
        assert!(b.is_hero);
        assert_eq!(b.stock_count, Some(0));
        assert_eq!(b.description_html, "<p>curated</p>");
        assert_eq!(catalog.hero().unwrap().id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_inactive_local_row_is_left_out_of_fallback() {
        let mut retired = local("old", true, None);
        retired.is_active = false;
        let catalog = Catalog::load(
            &FakeStorefront(Ok(vec![])),
            &FakeLocal(Some(vec![retired, local("new", false, None)])),
        )
        .await
        .unwrap();

        assert_eq!(catalog.products().len(), 1);
        assert_eq!(catalog.hero().unwrap().id.as_str(), "new");
    }

    #[tokio::test]
    async fn test_load_falls_back_to_local_hero_first() {
        let catalog = Catalog::load(
            &FakeStorefront(Ok(vec![])),
            &FakeLocal(Some(vec![
                local("plain", false, None),
                local("star", true, Some(5)),
            ])),
        )
        .await
        .unwrap();

        assert_eq!(catalog.source(), CatalogSource::Local);
        assert_eq!(catalog.products()[0].id.as_str(), "star");
        assert_eq!(catalog.products()[0].name, "Local star");
    }

    #[tokio::test]
    async fn test_load_survives_storefront_error() {
        let catalog = Catalog::load(
            &FakeStorefront(Err(503)),
            &FakeLocal(Some(vec![local("only", false, None)])),
        )
        .await
        .unwrap();
        assert_eq!(catalog.source(), CatalogSource::Local);
        assert_eq!(catalog.hero().unwrap().id.as_str(), "only");
    }

    #[tokio::test]
    async fn test_storefront_with_failing_local_keeps_storefront() {
        let catalog = Catalog::load(&FakeStorefront(Ok(vec![product("a", 100)])), &FakeLocal(None))
            .await
            .unwrap();
        assert_eq!(catalog.products().len(), 1);
        assert_eq!(catalog.hero().unwrap().id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_both_sources_down_is_an_error() {
        let result = Catalog::load(&FakeStorefront(Err(500)), &FakeLocal(None)).await;
        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }

    #[test]
    fn test_hero_defaults_to_first() {
        let catalog = Catalog {
            products: vec![product("x", 1), product("y", 2)],
            source: CatalogSource::Storefront,
        };
        assert_eq!(catalog.hero().unwrap().id.as_str(), "x");
        assert!(catalog.find(&ProductId::new("y")).is_some());
    }
}
