use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::finance::{self, InvestmentSummary};

/// The user's own verdict on a listing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    #[serde(alias = "👍")]
    Interested,
    #[serde(alias = "👎")]
    NotInterested,
    #[serde(alias = "🤔")]
    Undecided,
    #[default]
    #[serde(alias = "")]
    Unset,
}

impl UserStatus {
    pub fn is_set(&self) -> bool {
        *self != UserStatus::Unset
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            UserStatus::Interested => "👍",
            UserStatus::NotInterested => "👎",
            UserStatus::Undecided => "🤔",
            UserStatus::Unset => "",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interested" | "👍" => Ok(UserStatus::Interested),
            "not-interested" | "not_interested" | "👎" => Ok(UserStatus::NotInterested),
            "undecided" | "🤔" => Ok(UserStatus::Undecided),
            "unset" | "" => Ok(UserStatus::Unset),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

/// A single annotation write, see `ListingCache::annotate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Analysis(String),
    Status(UserStatus),
}

/// One real-estate sale ad and the financial figures extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,

    // Financial fields, refreshed by every scrape
    #[serde(default, deserialize_with = "whole_units")]
    pub price: Option<u64>,
    pub monthly_rent: Option<f64>,
    pub annual_rent: Option<f64>,
    pub monthly_charges: Option<f64>,
    pub annual_charges: Option<f64>,
    #[serde(alias = "taxe_fonciere_annual")]
    pub annual_property_tax: Option<f64>,
    pub gross_yield_pct: Option<f64>,
    pub net_yield_pct: Option<f64>,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,

    // Annotations, owned by the user and the advisory service
    #[serde(default)]
    pub analysis_ai: Option<String>,
    #[serde(default)]
    pub user_status: UserStatus,
}

/// Older cache files stored the price as a float.
fn whole_units<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| *v > 0.0).map(|v| v.round() as u64))
}

impl ListingRecord {
    /// An empty record for `url`; every financial field unset.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            price: None,
            monthly_rent: None,
            annual_rent: None,
            monthly_charges: None,
            annual_charges: None,
            annual_property_tax: None,
            gross_yield_pct: None,
            net_yield_pct: None,
            scraped_at: None,
            analysis_ai: None,
            user_status: UserStatus::Unset,
        }
    }

    /// Price and monthly rent both known and positive.
    pub fn is_complete(&self) -> bool {
        matches!(self.price, Some(price) if price > 0)
            && matches!(self.monthly_rent, Some(rent) if rent > 0.0)
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis_ai.as_deref().is_some_and(|text| !text.trim().is_empty())
    }

    /// Recompute `annual_rent` and both yields from price, rent, charges and tax.
    pub fn compute_yields(&mut self) {
        self.annual_rent = self.monthly_rent.map(|rent| finance::round_cents(rent * 12.0));
        self.update_yields();
    }

    /// Store a rent given at full precision. Both figures are rounded to
    /// cents separately, so an annual rent quoted by the ad is kept as is.
    pub fn set_rent(&mut self, monthly_rent: f64, annual_rent: f64) {
        self.monthly_rent = Some(finance::round_cents(monthly_rent));
        self.annual_rent = Some(finance::round_cents(annual_rent));
        self.update_yields();
    }

    fn update_yields(&mut self) {
        let (Some(price), Some(annual_rent)) = (self.price, self.annual_rent) else {
            self.gross_yield_pct = None;
            self.net_yield_pct = None;
            return;
        };

        self.gross_yield_pct = finance::gross_yield_pct(price, annual_rent);
        self.net_yield_pct = finance::net_yield_pct(
            price,
            annual_rent,
            self.annual_charges.unwrap_or(0.0),
            self.annual_property_tax.unwrap_or(0.0),
        );
    }

    /// Overwrite every financial field with `fresh`'s, leaving annotations alone.
    pub fn apply_financials(&mut self, fresh: &ListingRecord) {
        self.title = fresh.title.clone();
        self.price = fresh.price;
        self.monthly_rent = fresh.monthly_rent;
        self.annual_rent = fresh.annual_rent;
        self.monthly_charges = fresh.monthly_charges;
        self.annual_charges = fresh.annual_charges;
        self.annual_property_tax = fresh.annual_property_tax;
        self.gross_yield_pct = fresh.gross_yield_pct;
        self.net_yield_pct = fresh.net_yield_pct;
        self.scraped_at = fresh.scraped_at;
    }

    pub fn investment_summary(&self) -> Option<InvestmentSummary> {
        InvestmentSummary::compute(
            &self.title,
            self.price?,
            self.monthly_rent?,
            self.monthly_charges.unwrap_or(0.0),
            self.annual_property_tax.unwrap_or(0.0),
        )
    }
}
