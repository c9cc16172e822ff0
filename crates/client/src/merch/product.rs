//! Catalog product and description sanitizing.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use lullwave_core::{Price, ProductId, VariantId};

/// A product as shown in the merch shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Sanitized HTML; safe to render.
    pub description_html: String,
    pub price: Price,
    pub image_url: Option<String>,
    pub images: Vec<String>,
    /// Purchasable variant; products without one can't be checked out.
    pub variant_id: Option<VariantId>,
    pub stock_count: Option<i32>,
    pub is_hero: bool,
    pub is_active: bool,
}

impl Product {
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.stock_count.is_none_or(|count| count > 0)
    }
}

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "b", "em", "i", "u", "ul", "ol", "li", "h2", "h3", "h4", "span", "a",
];

static DANGEROUS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<iframe\b.*?</iframe\s*>|<object\b.*?</object\s*>",
    )
    .expect("Invalid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(/?)\s*([a-z][a-z0-9]*)\b([^>]*)>")
        .expect("Invalid regex")
});

static SAFE_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*["'](https?://[^"'<>\s]*)["']"#)
        .expect("Invalid regex")
});

/// Reduce storefront HTML to a small allow-list of formatting tags.
///
/// Script-like blocks are removed with their content, disallowed tags are
/// dropped (their text is kept), and every attribute is stripped except an
/// `http(s)` `href` on links.
#[must_use]
pub fn sanitize_html(html: &str) -> String {
    let without_blocks = DANGEROUS_BLOCK.replace_all(html, "");
    TAG.replace_all(&without_blocks, |caps: &Captures<'_>| {
        let closing = &caps[1];
        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }
        if name == "a" && closing.is_empty() {
            return SAFE_HREF.captures(&caps[3]).map_or_else(
                || "<a>".to_string(),
                |href| format!(r#"<a href="{}" rel="noopener">"#, &href[1]),
            );
        }
        format!("<{closing}{name}>")
    })
    .into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_formatting() {
        assert_eq!(
            sanitize_html("<p class=\"x\">Soft <strong>cotton</strong></p>"),
            "<p>Soft <strong>cotton</strong></p>"
        );
    }

    #[test]
    fn test_sanitize_removes_scripts_and_handlers() {
        let dirty = "<p onclick=\"steal()\">Hi</p><script>alert(1)</script><img src=x onerror=y>";
        assert_eq!(sanitize_html(dirty), "<p>Hi</p>");
    }

    #[test]
    fn test_sanitize_links() {
        assert_eq!(
            sanitize_html(r#"<a href="https://lullwave.app/care" target="_blank">care</a>"#),
            r#"<a href="https://lullwave.app/care" rel="noopener">care</a>"#
        );
        assert_eq!(
            sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#),
            "<a>x</a>"
        );
    }

    #[test]
    fn test_sanitize_drops_unknown_tags_keeps_text() {
        assert_eq!(sanitize_html("<div><font>plain</font></div>"), "plain");
        assert_eq!(sanitize_html("<!-- note -->text"), "text");
    }

    #[test]
    fn test_in_stock() {
        let mut product = Product {
            id: ProductId::new("p1"),
            name: "Hoodie".to_string(),
            description_html: String::new(),
            price: Price::zero(lullwave_core::CurrencyCode::USD),
            image_url: None,
            images: vec![],
            variant_id: None,
            stock_count: None,
            is_hero: false,
            is_active: true,
        };
        assert!(product.in_stock());
        product.stock_count = Some(0);
        assert!(!product.in_stock());
    }
}
