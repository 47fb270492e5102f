//! Turns a listing page into a typed `ListingRecord`.

pub mod amount;
pub mod rules;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::models::finance::{MAX_PLAUSIBLE_GROSS_YIELD_PCT, round_cents};
use crate::models::ListingRecord;
use crate::utils::error::ExtractError;

pub use amount::{KeywordWindow, Period, parse_amount};
pub use rules::{RentRule, default_rent_rules};

use amount::{AMOUNT_PATTERN, amount_near_keyword, context, currency_amount_regex, detect_period};

const PRICE_KEYWORDS: [&str; 3] = ["prix de vente", "prix", "vente"];
const CHARGE_KEYWORDS: [&str; 4] = [
    "charges locatives",
    "charges mensuel",
    "charge de copropriété",
    "charges annuelles",
];
const PROPERTY_TAX_KEYWORD: &str = "taxe fonci";
/// The page-wide price fallback ignores anything at or below this.
const PRICE_FLOOR: i64 = 10_000;

/// Text and structured data pulled out of a listing document.
struct ListingDocument {
    title: String,
    /// Ad body first, then the visible page text.
    text: String,
    structured_price: Option<f64>,
}

pub struct ListingExtractor {
    title_selector: Selector,
    next_data_selector: Selector,
    amount_regex: Regex,
    rent_rules: Vec<RentRule>,
    charges_before_amount: Regex,
    charges_after_amount: Regex,
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingExtractor {
    pub fn new() -> Self {
        Self {
            title_selector: Selector::parse("title").expect("valid title selector"),
            next_data_selector: Selector::parse("script#__NEXT_DATA__").expect("valid script selector"),
            amount_regex: currency_amount_regex(),
            rent_rules: default_rent_rules(),
            charges_before_amount: Regex::new(&format!(r"(?i)charges\s+({})\s*(?:€|euros?)", AMOUNT_PATTERN))
                .expect("valid charges pattern"),
            charges_after_amount: Regex::new(&format!(r"(?i)({})\s*€\s+de\s+charges", AMOUNT_PATTERN))
                .expect("valid charges pattern"),
        }
    }

    /// Extract the financial record of the listing at `url` from its page.
    ///
    /// Returns a candidate whose yields are already computed; candidates
    /// with an implausible gross yield are rejected.
    pub fn extract(&self, url: &str, html: &str) -> Result<ListingRecord, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError::Malformed {
                message: "empty document".to_string(),
            });
        }

        let document = self.parse_document(html);
        let text = document.text.as_str();

        let price = self.find_price(&document)?;
        let rent = rules::find_rent(&self.rent_rules, text).ok_or(ExtractError::MissingRent)?;
        debug!("Rent rule '{}' matched for {}", rent.rule, url);

        let annual_property_tax = self.find_property_tax(text);
        let monthly_charges = self.find_monthly_charges(text);

        let mut record = ListingRecord::new(url);
        record.title = document.title;
        record.price = Some(price);
        record.monthly_charges = monthly_charges.map(round_cents);
        record.annual_charges = monthly_charges.map(|charges| round_cents(charges * 12.0));
        record.annual_property_tax = annual_property_tax.map(round_cents);

        let annual_rent = rent.monthly_rent * Decimal::from(12);
        match (rent.monthly_rent.to_f64(), annual_rent.to_f64()) {
            (Some(monthly), Some(annual)) => record.set_rent(monthly, annual),
            _ => {
                return Err(ExtractError::Malformed {
                    message: format!("rent not representable: {}", rent.monthly_rent),
                });
            }
        }

        if let Some(gross_yield_pct) = record.gross_yield_pct {
            if gross_yield_pct > MAX_PLAUSIBLE_GROSS_YIELD_PCT {
                return Err(ExtractError::ImplausibleYield { gross_yield_pct });
            }
        }

        Ok(record)
    }

    fn parse_document(&self, html: &str) -> ListingDocument {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let ad = self.next_data_ad(&document);
        let body = ad.as_ref().and_then(ad_body).unwrap_or_default();
        let structured_price = ad.as_ref().and_then(|ad| ad.pointer("/price/0")).and_then(number_value);

        let page_text = visible_text(&document);
        let text = if body.is_empty() {
            page_text
        } else {
            format!("{}\n{}", body, page_text)
        };

        ListingDocument {
            title,
            text,
            structured_price,
        }
    }

    /// `props.pageProps.ad` from the page's `__NEXT_DATA__` script.
    fn next_data_ad(&self, document: &Html) -> Option<Value> {
        let script = document.select(&self.next_data_selector).next()?;
        let data: Value = serde_json::from_str(&script.text().collect::<String>()).ok()?;
        data.pointer("/props/pageProps/ad").cloned()
    }

    /// The ad's own description, or the visible page text when it has none.
    pub fn ad_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        match self.next_data_ad(&document).as_ref().and_then(ad_body) {
            Some(body) if !body.trim().is_empty() => body.to_string(),
            _ => visible_text(&document),
        }
    }

    fn find_price(&self, document: &ListingDocument) -> Result<u64, ExtractError> {
        let price = match document.structured_price {
            Some(price) => Decimal::try_from(price).ok(),
            None => self.price_from_text(&document.text),
        }
        .ok_or(ExtractError::MissingPrice)?;

        match price.round().to_u64() {
            Some(0) | None => Err(ExtractError::Malformed {
                message: format!("unusable price {}", price),
            }),
            Some(price) => Ok(price),
        }
    }

    fn price_from_text(&self, text: &str) -> Option<Decimal> {
        let near_keyword = PRICE_KEYWORDS.iter().find_map(|keyword| {
            amount_near_keyword(text, keyword, KeywordWindow::Lenient, &self.amount_regex)
                .map(|(amount, _)| amount)
                .filter(|amount| !amount.is_zero())
        });
        if near_keyword.is_some() {
            return near_keyword;
        }

        // Sale prices dwarf every other amount on the page
        self.amount_regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).and_then(|m| parse_amount(m.as_str())))
            .filter(|amount| *amount > Decimal::from(PRICE_FLOOR))
            .max()
    }

    /// Annual property tax, if the listing states one.
    fn find_property_tax(&self, text: &str) -> Option<f64> {
        let (amount, snippet) =
            amount_near_keyword(text, PROPERTY_TAX_KEYWORD, KeywordWindow::Strict, &self.amount_regex)?;
        let amount = amount.to_f64()?;

        match detect_period(snippet) {
            Some(Period::Monthly) => Some(amount * 12.0),
            _ => Some(amount),
        }
    }

    /// Monthly charges, if the listing states any.
    fn find_monthly_charges(&self, text: &str) -> Option<f64> {
        let explicit = [&self.charges_before_amount, &self.charges_after_amount]
            .into_iter()
            .find_map(|pattern| {
                let caps = pattern.captures(text)?;
                let whole = caps.get(0)?;
                let amount = parse_amount(caps.get(1)?.as_str())?;
                Some((amount, context(text, whole.start(), whole.end(), 50, 100)))
            });

        let (amount, snippet) = explicit.or_else(|| {
            CHARGE_KEYWORDS.iter().find_map(|keyword| {
                amount_near_keyword(text, keyword, KeywordWindow::Strict, &self.amount_regex)
            })
        })?;
        let amount = amount.to_f64()?;

        match detect_period(snippet) {
            Some(Period::Annual) => Some(amount / 12.0),
            _ => Some(amount),
        }
    }
}

/// Text nodes outside `script`, `style` and `noscript`, one per line.
fn visible_text(document: &Html) -> String {
    let mut parts = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|element| matches!(element.name(), "script" | "style" | "noscript"));
        let text = text.trim();
        if !hidden && !text.is_empty() {
            parts.push(text);
        }
    }

    parts.join("\n")
}

fn ad_body(ad: &Value) -> Option<&str> {
    ad.get("body").and_then(Value::as_str)
}

/// A JSON number, or a string holding one.
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => parse_amount(raw).and_then(|amount| amount.to_f64()),
        _ => None,
    }
}
