//! Turning a cart into a storefront checkout session.

use thiserror::Error;
use tracing::{info, instrument, warn};

use lullwave_core::ProductId;

use super::cart::Cart;
use super::storefront::{CheckoutLine, StorefrontApi, StorefrontError};

/// Where to send the browser to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub url: String,
}

/// Checkout failures. All are recoverable; the cart is left untouched.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} has no purchasable variant")]
    MissingVariant(ProductId),

    /// The storefront accepted the cart but returned no checkout URL.
    #[error("storefront returned no checkout URL")]
    MissingCheckoutUrl,

    #[error("storefront error: {0}")]
    Storefront(#[from] StorefrontError),
}

impl CheckoutError {
    /// Short message suitable for a notification banner.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyCart => "Your cart is empty.",
            Self::MissingVariant(_) => "One of the items in your cart is no longer available.",
            Self::MissingCheckoutUrl | Self::Storefront(_) => {
                "Checkout is unavailable right now. Please try again."
            }
        }
    }
}

/// Map cart lines to storefront line items.
///
/// # Errors
///
/// Returns [`CheckoutError::EmptyCart`] or [`CheckoutError::MissingVariant`].
pub fn checkout_lines(cart: &Cart) -> Result<Vec<CheckoutLine>, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    cart.lines()
        .iter()
        .map(|line| {
            line.variant_id
                .clone()
                .map(|variant_id| CheckoutLine {
                    variant_id,
                    quantity: line.quantity,
                })
                .ok_or_else(|| CheckoutError::MissingVariant(line.product_id.clone()))
        })
        .collect()
}

/// Request a checkout session for `cart`.
///
/// # Errors
///
/// See [`CheckoutError`].
#[instrument(skip_all, fields(items = cart.item_count()))]
pub async fn checkout<S: StorefrontApi>(
    storefront: &S,
    cart: &Cart,
) -> Result<CheckoutRedirect, CheckoutError> {
    let lines = checkout_lines(cart)?;
    let Some(url) = storefront.create_checkout(&lines).await? else {
        warn!("Storefront returned no checkout URL");
        return Err(CheckoutError::MissingCheckoutUrl);
    };
    info!("Checkout session created");
    Ok(CheckoutRedirect { url })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::merch::catalog::tests::product;
    use crate::merch::product::Product;

    struct FakeStorefront {
        url: Option<String>,
        received: Mutex<Vec<CheckoutLine>>,
    }

    impl FakeStorefront {
        fn returning(url: Option<&str>) -> Self {
            Self {
                url: url.map(str::to_owned),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    impl StorefrontApi for FakeStorefront {
        async fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
            Ok(vec![])
        }

        async fn create_checkout(
            &self,
            lines: &[CheckoutLine],
        ) -> Result<Option<String>, StorefrontError> {
            self.received.lock().unwrap().extend_from_slice(lines);
            Ok(self.url.clone())
        }
    }

    #[tokio::test]
    async fn test_checkout_maps_lines_and_redirects() {
        let storefront = FakeStorefront::returning(Some("https://shop.test/checkout/1"));
        let mut cart = Cart::new();
        let hoodie = product("hoodie", 4900);
        cart.add(&hoodie);
        cart.add(&hoodie);

        let redirect = checkout(&storefront, &cart).await.unwrap();
        assert_eq!(redirect.url, "https://shop.test/checkout/1");

        let received = storefront.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].variant_id.as_str(), "hoodie-v");
        assert_eq!(received[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_missing_checkout_url_is_recoverable() {
        let storefront = FakeStorefront::returning(None);
        let mut cart = Cart::new();
        cart.add(&product("a", 100));

        let err = checkout(&storefront, &cart).await.unwrap_err();
        assert!(matches!(err, CheckoutError::MissingCheckoutUrl));
        assert!(!err.user_message().is_empty());
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_never_calls_storefront() {
        let storefront = FakeStorefront::returning(Some("https://shop.test/x"));
        let err = checkout(&storefront, &Cart::new()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
        assert!(storefront.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_line_without_variant_is_rejected() {
        let mut cart = Cart::new();
        let mut poster = product("poster", 500);
        poster.variant_id = None;
        cart.add(&poster);
        assert!(matches!(
            checkout_lines(&cart),
            Err(CheckoutError::MissingVariant(_))
        ));
    }
}
