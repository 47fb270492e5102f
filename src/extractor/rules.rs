use regex::Regex;
use rust_decimal::Decimal;

use super::amount::{AMOUNT_PATTERN, offset_after_chars, parse_amount};

/// Plausible monthly rent, in euros.
pub const MONTHLY_RENT_RANGE: (i64, i64) = (300, 3_000);
/// Plausible annual rent, in euros.
pub const ANNUAL_RENT_RANGE: (i64, i64) = (3_600, 36_000);

/// How a rule's captured amount maps to a monthly rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentPeriod {
    Monthly,
    Annual,
    /// Annual when the text right after the match mentions a yearly period.
    FromContext,
}

#[derive(Debug, Clone)]
pub struct RentRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub period: RentPeriod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RentMatch {
    pub rule: &'static str,
    pub monthly_rent: Decimal,
}

fn in_range(amount: Decimal, (min, max): (i64, i64)) -> bool {
    amount >= Decimal::from(min) && amount <= Decimal::from(max)
}

impl RentRule {
    fn new(name: &'static str, pattern: &str, period: RentPeriod) -> Self {
        Self {
            name,
            pattern: Regex::new(&pattern.replace("AMT", AMOUNT_PATTERN)).expect("valid rent pattern"),
            period,
        }
    }

    /// Monthly rent from the first match of this rule, if plausible.
    pub fn apply(&self, text: &str) -> Option<RentMatch> {
        let captures = self.pattern.captures(text)?;
        let whole = captures.get(0)?;
        let amount = parse_amount(captures.get(1)?.as_str())?;

        let period = match self.period {
            RentPeriod::FromContext => {
                let following = &text[whole.start()..offset_after_chars(text, whole.end(), 100)];
                let following = following.to_lowercase();
                if following.contains("annuel") || following.contains("par an") || following.contains("/an") {
                    RentPeriod::Annual
                } else {
                    RentPeriod::Monthly
                }
            }
            period => period,
        };

        let monthly_rent = match period {
            RentPeriod::Annual if in_range(amount, ANNUAL_RENT_RANGE) => amount / Decimal::from(12),
            RentPeriod::Monthly if in_range(amount, MONTHLY_RENT_RANGE) => amount,
            _ => return None,
        };

        Some(RentMatch {
            rule: self.name,
            monthly_rent,
        })
    }
}

/// Rent rules, most specific first. The order decides which figure wins on
/// listings that quote several.
pub fn default_rent_rules() -> Vec<RentRule> {
    vec![
        RentRule::new(
            "annual_rent_label",
            r"(?i)loyer\s+annuel\s*:?\s*(AMT)\s*(?:€|euros?)",
            RentPeriod::Annual,
        ),
        RentRule::new(
            "monthly_rent_label",
            r"(?i)loyer\s+mensuel\s+de\s+(AMT)",
            RentPeriod::Monthly,
        ),
        RentRule::new(
            "rent_per_year",
            r"(?i)loyer[^0-9]*(AMT)\s*€\s*(?:/\s*an|par\s+an)",
            RentPeriod::Annual,
        ),
        RentRule::new(
            "rent_euro_symbol",
            r"(?i)loyer[^0-9]*(AMT)\s*€",
            RentPeriod::FromContext,
        ),
        RentRule::new(
            "rent_euro_word",
            r"(?i)loyer\s+(AMT)\s+euros?",
            RentPeriod::Monthly,
        ),
        RentRule::new(
            "soit_per_month",
            r"(?is)soit\s+.*?(AMT)\s*euros?\s+par\s+mois",
            RentPeriod::Monthly,
        ),
    ]
}

/// First plausible rent among `rules`, evaluated in order.
pub fn find_rent(rules: &[RentRule], text: &str) -> Option<RentMatch> {
    rules.iter().find_map(|rule| rule.apply(text))
}
