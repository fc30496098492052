use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::utils::error::{AppError, Result};

/// Tried in order when the product has no selector or it matched nothing.
pub const COMMON_PRICE_SELECTORS: [&str; 11] = [
    ".price",
    "#price",
    ".product-price",
    ".current-price",
    "[data-price]",
    ".price-current",
    ".price-now",
    ".offer-price",
    ".sale-price",
    ".final-price",
    "[itemprop=price]",
];

/// Attributes that commonly carry a machine-readable price.
const PRICE_ATTRIBUTES: [&str; 2] = ["content", "data-price"];

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").expect("number pattern compiles"));

// Whole-page fallbacks. Each must be anchored on a currency marker so that
// stray numbers (ratings, stock counts) are not mistaken for prices.
static TEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\$\s*\d[\d,]*(?:\.\d+)?",
        r"USD\s*\d[\d,]*(?:\.\d+)?",
        r"\d[\d,]*(?:\.\d+)?\s*USD",
        r"(?i)price:\s*\$?\s*\d[\d,]*(?:\.\d+)?",
        r"[£€]\s*\d[\d,]*(?:\.\d+)?",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("price pattern compiles"))
    .collect()
});

static COMMON_SELECTORS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    COMMON_PRICE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok().map(|selector| (*s, selector)))
        .collect()
});

/// Which rule produced a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum MatchedRule {
    CustomSelector(String),
    CommonSelector(String),
    TextPattern(String),
}

impl fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedRule::CustomSelector(s) => write!(f, "selector '{}'", s),
            MatchedRule::CommonSelector(s) => write!(f, "common selector '{}'", s),
            MatchedRule::TextPattern(s) => write!(f, "page text '{}'", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub price: Decimal,
    pub rule: MatchedRule,
}

/// Takes the first number-like token of `text` as a price. Thousands
/// separators are allowed; zero is not a price.
pub fn parse_price_text(text: &str) -> Option<Decimal> {
    let token = NUMBER.find(text)?;
    let cleaned = token.as_str().replace(',', "");
    let price = Decimal::from_str(&cleaned).ok()?;
    if price <= Decimal::ZERO {
        return None;
    }
    // Keep the scale the page showed ("19.90" stays "19.90")
    Some(if price.scale() > 4 { price.round_dp(4) } else { price })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PriceExtractor;

impl PriceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Finds a price in `html`. `Ok(None)` means nothing matched; an invalid
    /// custom selector is an error.
    pub fn extract(&self, html: &str, selector: Option<&str>) -> Result<Option<Extraction>> {
        let document = Html::parse_document(html);

        if let Some(custom) = selector.map(str::trim).filter(|s| !s.is_empty()) {
            let parsed = Selector::parse(custom).map_err(|e| AppError::InvalidSelector {
                selector: custom.to_string(),
                message: format!("{:?}", e),
            })?;

            if let Some(price) = Self::first_price(&document, &parsed) {
                return Ok(Some(Extraction {
                    price,
                    rule: MatchedRule::CustomSelector(custom.to_string()),
                }));
            }
        }

        for (name, common) in COMMON_SELECTORS.iter() {
            if let Some(price) = Self::first_price(&document, common) {
                return Ok(Some(Extraction {
                    price,
                    rule: MatchedRule::CommonSelector(name.to_string()),
                }));
            }
        }

        let text = Self::page_text(&document);
        for pattern in TEXT_PATTERNS.iter() {
            for found in pattern.find_iter(&text) {
                if let Some(price) = parse_price_text(found.as_str()) {
                    return Ok(Some(Extraction {
                        price,
                        rule: MatchedRule::TextPattern(found.as_str().trim().to_string()),
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Validates a selector without fetching anything.
    pub fn check_selector(selector: &str) -> Result<()> {
        Selector::parse(selector)
            .map(|_| ())
            .map_err(|e| AppError::InvalidSelector {
                selector: selector.to_string(),
                message: format!("{:?}", e),
            })
    }

    fn first_price(document: &Html, selector: &Selector) -> Option<Decimal> {
        document.select(selector).find_map(|element| Self::element_price(&element))
    }

    fn element_price(element: &ElementRef) -> Option<Decimal> {
        let text = element.text().collect::<Vec<_>>().join(" ");
        parse_price_text(text.trim()).or_else(|| {
            PRICE_ATTRIBUTES
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .find_map(parse_price_text)
        })
    }

    fn page_text(document: &Html) -> String {
        // Script and style bodies are not visible text
        let hidden = Selector::parse("script, style, noscript").ok();
        let body = Selector::parse("body").ok();

        let root = body
            .as_ref()
            .and_then(|s| document.select(s).next())
            .unwrap_or_else(|| document.root_element());

        let mut text = String::new();
        for node in root.descendants() {
            if let Some(chunk) = node.value().as_text() {
                let in_hidden = node.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
                    hidden.as_ref().is_some_and(|h| h.matches(&ancestor))
                });
                if !in_hidden {
                    text.push_str(chunk);
                    text.push(' ');
                }
            }
        }
        text
    }
}
