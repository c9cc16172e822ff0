//! Merch shop: catalog aggregation, cart, and checkout.
//!
//! # Flow
//!
//! 1. [`Catalog::load`] reads the storefront, overlaying curated fields from
//!    the local `products` table (or falling back to it entirely)
//! 2. The session's [`Cart`] collects lines, one per product
//! 3. [`checkout`] maps the cart to storefront line items and returns the
//!    URL to redirect to

mod cart;
mod catalog;
mod checkout;
mod product;
mod storefront;

pub use cart::{Cart, CartLine};
pub use catalog::{
    Catalog, CatalogError, CatalogSource, LocalCatalog, LocalProduct, merge_products,
};
pub use checkout::{CheckoutError, CheckoutRedirect, checkout, checkout_lines};
pub use product::{Product, sanitize_html};
pub use storefront::{CheckoutLine, StorefrontApi, StorefrontClient, StorefrontError};
