//! Integration tests for client engines over shared device-local state.
//!
//! Each "session" reopens the state file, the way an app restart would.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use lullwave_client::analytics::{AnalyticsEvent, AnalyticsService, AnalyticsSink};
use lullwave_client::backend::BackendError;
use lullwave_client::config::AnalyticsConfig;
use lullwave_client::merch::{
    Cart, Catalog, CatalogSource, CheckoutError, CheckoutLine, LocalCatalog, LocalProduct,
    Product, StorefrontApi, StorefrontError, checkout,
};
use lullwave_client::storage::{FileStore, LocalStore};
use lullwave_client::vault::{GateState, PinOutcome, Vault};
use lullwave_core::{AnalyticsEventType, AnalyticsSessionId, CurrencyCode, Price, ProductId, VariantId};

fn open_store(path: &Path) -> Arc<dyn LocalStore> {
    Arc::new(FileStore::open(path).unwrap())
}

fn enter(vault: &mut Vault, pin: &str) -> PinOutcome {
    let mut last = PinOutcome::Ignored;
    for digit in pin.chars() {
        last = vault.press_digit(digit).unwrap();
    }
    last
}

// =============================================================================
// Vault
// =============================================================================

#[test]
fn test_vault_pin_survives_restart_and_rejects_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    // First session: no PIN yet, so the entry becomes the PIN
    let mut vault = Vault::new(open_store(&path));
    assert_eq!(vault.unlock(), GateState::PinSetup);
    assert_eq!(enter(&mut vault, "1234"), PinOutcome::PinSet);
    assert!(vault.gate().is_unlocked());
    vault.open_new().unwrap();
    vault.save("breathe in for four").unwrap();
    drop(vault);

    // Second session: a wrong PIN errors and stays locked
    let mut vault = Vault::new(open_store(&path));
    assert_eq!(vault.unlock(), GateState::PinEntry { error: false });
    assert_eq!(enter(&mut vault, "9999"), PinOutcome::Mismatch);
    assert_eq!(vault.gate().state(), GateState::PinEntry { error: true });
    assert!(vault.entries().is_empty());

    // Notes were session-only; the right PIN opens an empty vault
    assert_eq!(enter(&mut vault, "1234"), PinOutcome::Unlocked);
    assert!(vault.entries().is_empty());
}

#[test]
fn test_vault_notes_never_reach_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut vault = Vault::new(open_store(&path));
    vault.unlock();
    enter(&mut vault, "2580");
    vault.open_new().unwrap();
    vault.save("a very private thought").unwrap();

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(!on_disk.contains("private thought"));
    assert!(!on_disk.contains("2580"));
}

// =============================================================================
// Analytics
// =============================================================================

#[derive(Clone, Default)]
struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<AnalyticsEvent>>>>,
}

impl AnalyticsSink for RecordingSink {
    async fn create_session(&self, _fingerprint: &str) -> Result<AnalyticsSessionId, BackendError> {
        Ok(AnalyticsSessionId::new())
    }

    async fn send_events(&self, events: &[AnalyticsEvent]) -> Result<(), BackendError> {
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn test_analytics_consent_and_fingerprint_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let sink = RecordingSink::default();

    let first = AnalyticsService::new(sink.clone(), open_store(&path), AnalyticsConfig::default());
    assert!(!first.has_consent());
    first.page_view("/sounds").await;
    assert_eq!(first.buffered_len(), 0);

    first.set_consent(true).await;
    first.report_error("audio decode failed", Some("player")).await;

    let sent: Vec<AnalyticsEvent> = sink.batches.lock().unwrap().concat();
    assert!(sent.iter().any(|e| e.event_type == AnalyticsEventType::Error));
    assert!(sent.iter().all(|e| e.session_id.is_some()));
    let fingerprint = first.fingerprint().to_string();
    first.shutdown().await;
    drop(first);

    let second = AnalyticsService::new(sink.clone(), open_store(&path), AnalyticsConfig::default());
    assert!(second.has_consent());
    assert_eq!(second.fingerprint(), fingerprint);

    second.start().await;
    second.page_view("/vault").await;
    let buffered = second.buffered_events();
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered[0].metadata_str("path"), Some("/vault"));
    second.shutdown().await;
}

// =============================================================================
// Merch
// =============================================================================

fn storefront_product(id: &str, cents: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Storefront {id}"),
        description_html: String::new(),
        price: Price::new(Decimal::new(cents, 2), CurrencyCode::USD),
        image_url: None,
        images: Vec::new(),
        variant_id: Some(VariantId::new(format!("{id}-v"))),
        stock_count: None,
        is_hero: false,
        is_active: true,
    }
}

#[derive(Default)]
struct FakeStorefront {
    products: Option<Vec<Product>>,
    received: Mutex<Vec<CheckoutLine>>,
}

impl StorefrontApi for FakeStorefront {
    async fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
        self.products.clone().ok_or(StorefrontError::Timeout)
    }

    async fn create_checkout(
        &self,
        lines: &[CheckoutLine],
    ) -> Result<Option<String>, StorefrontError> {
        self.received.lock().unwrap().extend_from_slice(lines);
        Ok(Some("https://shop.lullwave.test/checkout/abc".to_string()))
    }
}

struct FakeLocal(Vec<LocalProduct>);

impl LocalCatalog for FakeLocal {
    async fn active_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
        Ok(self.0.iter().filter(|p| p.is_active).cloned().collect())
    }

    async fn curated_products(&self) -> Result<Vec<LocalProduct>, BackendError> {
        Ok(self.0.clone())
    }
}

fn local_row(id: &str, is_hero: bool, variant: Option<&str>) -> LocalProduct {
    LocalProduct {
        id: ProductId::new(id),
        name: format!("Local {id}"),
        description: Some("<p>Soft cotton.</p><script>alert(1)</script>".to_string()),
        price: Decimal::new(3000, 2),
        currency: None,
        image_url: None,
        variant_id: variant.map(VariantId::new),
        stock_count: Some(4),
        is_hero,
        is_active: true,
    }
}

#[tokio::test]
async fn test_browse_add_and_check_out() {
    let storefront = FakeStorefront {
        products: Some(vec![storefront_product("mask", 1500), storefront_product("tee", 2800)]),
        ..FakeStorefront::default()
    };
    let local = FakeLocal(vec![local_row("tee", true, None)]);

    let catalog = Catalog::load(&storefront, &local).await.unwrap();
    assert_eq!(catalog.source(), CatalogSource::Storefront);
    let hero = catalog.hero().unwrap().clone();
    assert_eq!(hero.id, ProductId::new("tee"));
    assert!(!hero.description_html.contains("script"));

    let mut cart = Cart::new();
    cart.add(&hero);
    cart.add(&hero);
    cart.add(catalog.find(&ProductId::new("mask")).unwrap());
    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.subtotal().to_string(), "$71.00");

    let redirect = checkout(&storefront, &cart).await.unwrap();
    assert_eq!(redirect.url, "https://shop.lullwave.test/checkout/abc");

    let lines = storefront.received.lock().unwrap().clone();
    assert_eq!(lines.len(), 2);
    let tee = lines.iter().find(|l| l.variant_id.as_str() == "tee-v").unwrap();
    assert_eq!(tee.quantity, 2);
}

#[tokio::test]
async fn test_local_fallback_without_variant_cannot_check_out() {
    let storefront = FakeStorefront::default();
    let local = FakeLocal(vec![local_row("pillow", false, None), local_row("eye", true, Some("eye-v"))]);

    let catalog = Catalog::load(&storefront, &local).await.unwrap();
    assert_eq!(catalog.source(), CatalogSource::Local);
    assert_eq!(catalog.products()[0].id, ProductId::new("eye"));

    let mut cart = Cart::new();
    cart.add(catalog.find(&ProductId::new("pillow")).unwrap());
    let err = checkout(&storefront, &cart).await.unwrap_err();
    assert!(matches!(err, CheckoutError::MissingVariant(_)));
    assert!(storefront.received.lock().unwrap().is_empty());

    assert!(matches!(
        checkout(&storefront, &Cart::new()).await.unwrap_err(),
        CheckoutError::EmptyCart
    ));
}
