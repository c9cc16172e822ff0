//! Merch storefront API client.
//!
//! Two calls: the product listing (`GET collections/all/products`) and cart
//! creation (`POST carts`), both authorised with a `storefront_token` query
//! parameter. The product listing is cached for 5 minutes using `moka`.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::Url;

use lullwave_core::{CurrencyCode, Price, ProductId, VariantId};

use super::product::{Product, sanitize_html};
use crate::config::StorefrontConfig;

/// Errors that can occur when talking to the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Rate limited by the storefront.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Storefront returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured API URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl StorefrontError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// One line of a checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// The storefront operations the shop needs.
pub trait StorefrontApi: Send + Sync {
    /// All products in the default collection.
    fn list_products(
        &self,
    ) -> impl Future<Output = Result<Vec<Product>, StorefrontError>> + Send;

    /// Create a cart for `lines` and return its checkout URL, if the
    /// storefront supplied one.
    fn create_checkout(
        &self,
        lines: &[CheckoutLine],
    ) -> impl Future<Output = Result<Option<String>, StorefrontError>> + Send;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ProductsResponse {
    Wrapped { products: Vec<ApiProduct> },
    Bare(Vec<ApiProduct>),
}

impl ProductsResponse {
    fn into_products(self) -> Vec<ApiProduct> {
        match self {
            Self::Wrapped { products } | Self::Bare(products) => products,
        }
    }
}

#[derive(Deserialize)]
struct ApiProduct {
    id: String,
    #[serde(alias = "title")]
    name: String,
    #[serde(default, alias = "description_html", alias = "descriptionHtml")]
    description: Option<String>,
    #[serde(default)]
    images: Vec<ApiImage>,
    #[serde(default)]
    variants: Vec<ApiVariant>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiImage {
    Url(String),
    Object { url: String },
}

#[derive(Deserialize)]
struct ApiVariant {
    id: String,
    #[serde(alias = "unitPrice", alias = "price")]
    unit_price: ApiAmount,
    #[serde(default, alias = "currency_code", alias = "currencyCode")]
    currency: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiAmount {
    Text(String),
    Number(serde_json::Number),
}

impl ApiAmount {
    fn to_price(&self, currency: CurrencyCode) -> Option<Price> {
        match self {
            Self::Text(text) => Price::parse(text, currency).ok(),
            Self::Number(number) => Price::parse(&number.to_string(), currency).ok(),
        }
    }
}

#[derive(Serialize)]
struct CartRequest<'a> {
    lines: &'a [CheckoutLine],
}

#[derive(Deserialize)]
struct CartResponse {
    #[serde(default, alias = "checkoutUrl")]
    checkout_url: Option<String>,
}

fn convert_product(api: ApiProduct) -> Product {
    let variant = api.variants.into_iter().next();
    let price = variant.as_ref().and_then(|v| {
        let currency = v
            .currency
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default();
        v.unit_price.to_price(currency)
    });
    if price.is_none() {
        warn!(product_id = %api.id, "Storefront product has no usable price");
    }

    let images: Vec<String> = api
        .images
        .into_iter()
        .map(|image| match image {
            ApiImage::Url(url) | ApiImage::Object { url } => url,
        })
        .collect();

    Product {
        id: ProductId::new(api.id),
        name: api.name,
        description_html: sanitize_html(api.description.as_deref().unwrap_or_default()),
        price: price.unwrap_or_else(|| Price::zero(CurrencyCode::default())),
        image_url: images.first().cloned(),
        images,
        variant_id: variant.map(|v| VariantId::new(v.id)),
        stock_count: None,
        is_hero: false,
        is_active: true,
    }
}

// =============================================================================
// StorefrontClient
// =============================================================================

const PRODUCTS_CACHE_KEY: &str = "products:all";

/// Client for the merch storefront API.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: SecretString,
    cache: Cache<String, Vec<Product>>,
}

impl StorefrontClient {
    /// Create a new storefront client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid or the HTTP client fails to build.
    pub fn new(config: &StorefrontConfig) -> Result<Self, StorefrontError> {
        let mut base_url = Url::parse(&config.api_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StorefrontError::from_reqwest)?;

        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                base_url,
                token: config.token.clone(),
                cache,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StorefrontError> {
        let mut url = self.inner.base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair("storefront_token", self.inner.token.expose_secret());
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StorefrontError> {
        let response = request
            .send()
            .await
            .map_err(StorefrontError::from_reqwest)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StorefrontError::RateLimited(retry_after));
        }

        let body = response
            .text()
            .await
            .map_err(StorefrontError::from_reqwest)?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Storefront API returned non-success status"
            );
            return Err(StorefrontError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }

    /// Drop the cached product listing.
    pub async fn invalidate_products(&self) {
        self.inner.cache.invalidate(PRODUCTS_CACHE_KEY).await;
    }
}

impl StorefrontApi for StorefrontClient {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
        if let Some(products) = self.inner.cache.get(PRODUCTS_CACHE_KEY).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let url = self.endpoint("collections/all/products")?;
        let body = self.send(self.inner.client.get(url)).await?;
        let response: ProductsResponse = serde_json::from_str(&body).inspect_err(|e| {
            error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse storefront products"
            );
        })?;

        let products: Vec<Product> = response
            .into_products()
            .into_iter()
            .map(convert_product)
            .collect();

        self.inner
            .cache
            .insert(PRODUCTS_CACHE_KEY.to_string(), products.clone())
            .await;

        Ok(products)
    }

    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn create_checkout(
        &self,
        lines: &[CheckoutLine],
    ) -> Result<Option<String>, StorefrontError> {
        let url = self.endpoint("carts")?;
        let request = self
            .inner
            .client
            .post(url)
            .json(&CartRequest { lines });
        let body = self.send(request).await?;
        let response: CartResponse = serde_json::from_str(&body)?;
        Ok(response.checkout_url.filter(|url| !url.trim().is_empty()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_wrapped_products_response() {
        let json = r#"{
            "products": [{
                "id": "prod_1",
                "name": "Whisper Hoodie",
                "description": "<p onclick=\"x()\">Soft</p>",
                "images": [{"url": "https://cdn.test/a.jpg"}, "https://cdn.test/b.jpg"],
                "variants": [{"id": "var_1", "unit_price": "49.00", "currency": "USD"}]
            }]
        }"#;
        let response: ProductsResponse = serde_json::from_str(json).unwrap();
        let product = convert_product(response.into_products().remove(0));

        assert_eq!(product.id.as_str(), "prod_1");
        assert_eq!(product.description_html, "<p>Soft</p>");
        assert_eq!(product.price.amount, Decimal::new(4900, 2));
        assert_eq!(product.image_url.as_deref(), Some("https://cdn.test/a.jpg"));
        assert_eq!(product.images.len(), 2);
        assert_eq!(product.variant_id, Some(VariantId::new("var_1")));
        assert!(!product.is_hero);
    }

    #[test]
    fn test_parse_bare_products_with_numeric_price() {
        let json = r#"[{"id": "p", "title": "Mask", "variants": [{"id": "v", "price": 12.5, "currency_code": "EUR"}]}]"#;
        let response: ProductsResponse = serde_json::from_str(json).unwrap();
        let product = convert_product(response.into_products().remove(0));

        assert_eq!(product.name, "Mask");
        assert_eq!(product.price.amount, Decimal::new(125, 1));
        assert_eq!(product.price.currency_code, CurrencyCode::EUR);
        assert!(product.image_url.is_none());
    }

    #[test]
    fn test_product_without_variants_has_no_variant() {
        let json = r#"[{"id": "p", "name": "Poster"}]"#;
        let response: ProductsResponse = serde_json::from_str(json).unwrap();
        let product = convert_product(response.into_products().remove(0));
        assert!(product.variant_id.is_none());
        assert_eq!(product.price.amount, Decimal::ZERO);
    }

    #[test]
    fn test_checkout_line_wire_shape() {
        let json = serde_json::to_value(CartRequest {
            lines: &[CheckoutLine {
                variant_id: VariantId::new("var_1"),
                quantity: 2,
            }],
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"lines": [{"variantId": "var_1", "quantity": 2}]})
        );
    }

    #[test]
    fn test_cart_response_accepts_camel_case() {
        let response: CartResponse =
            serde_json::from_str(r#"{"checkoutUrl": "https://shop.test/c/1"}"#).unwrap();
        assert_eq!(response.checkout_url.as_deref(), Some("https://shop.test/c/1"));
        let response: CartResponse = serde_json::from_str("{}").unwrap();
        assert!(response.checkout_url.is_none());
    }

    #[test]
    fn test_token_sent_as_query_parameter() {
        let client = StorefrontClient::new(&StorefrontConfig {
            api_url: "https://shop.test/api".to_string(),
            token: SecretString::from("tok"),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let url = client.endpoint("collections/all/products").unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.test/api/collections/all/products?storefront_token=tok"
        );
    }
}
