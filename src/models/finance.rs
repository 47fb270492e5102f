use regex::Regex;
use serde::{Deserialize, Serialize};

/// Above this gross yield the detected rent is almost certainly not a rent.
pub const MAX_PLAUSIBLE_GROSS_YIELD_PCT: f64 = 20.0;

pub const NOTARY_FEE_RATE: f64 = 0.075;
pub const LOAN_RATE_PCT: f64 = 3.09;
pub const LOAN_INSURANCE_PCT: f64 = 0.15;
pub const LOAN_YEARS: u32 = 20;

/// `annual_rent / price * 100`, undefined for a zero price.
pub fn gross_yield_pct(price: u64, annual_rent: f64) -> Option<f64> {
    if price == 0 {
        return None;
    }
    Some(annual_rent / price as f64 * 100.0)
}

/// `(annual_rent - annual_charges - annual_property_tax) / price * 100`.
pub fn net_yield_pct(
    price: u64,
    annual_rent: f64,
    annual_charges: f64,
    annual_property_tax: f64,
) -> Option<f64> {
    if price == 0 {
        return None;
    }
    Some((annual_rent - annual_charges - annual_property_tax) / price as f64 * 100.0)
}

/// Round half away from zero to cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Surface in m² announced in a listing title ("Studio 18 m²").
pub fn surface_from_title(title: &str) -> Option<u32> {
    let surface_regex = Regex::new(r"(\d+)\s*m²").ok()?;
    surface_regex
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|surface| *surface > 0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestmentSummary {
    /// Years of gross rent needed to repay the price.
    pub payback_years: f64,
    pub annual_income: f64,
    pub annual_expenses: f64,
    pub annual_net_profit: f64,
    pub monthly_cash_flow: f64,
    pub price_per_m2: Option<f64>,
}

impl InvestmentSummary {
    pub fn compute(
        title: &str,
        price: u64,
        monthly_rent: f64,
        monthly_charges: f64,
        annual_property_tax: f64,
    ) -> Option<Self> {
        if price == 0 || monthly_rent <= 0.0 {
            return None;
        }

        let annual_income = monthly_rent * 12.0;
        let annual_expenses = monthly_charges * 12.0 + annual_property_tax;
        let price_per_m2 = surface_from_title(title).map(|surface| price as f64 / surface as f64);

        Some(Self {
            payback_years: price as f64 / annual_income,
            annual_income,
            annual_expenses,
            annual_net_profit: annual_income - annual_expenses,
            monthly_cash_flow: monthly_rent - monthly_charges - annual_property_tax / 12.0,
            price_per_m2,
        })
    }

    /// Whole years and remaining months of the payback period.
    pub fn payback_years_months(&self) -> (u32, u32) {
        let years = self.payback_years.trunc();
        let months = ((self.payback_years - years) * 12.0).trunc();
        (years as u32, months as u32)
    }
}

/// Mortgage estimate for buying the listing on credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancingEstimate {
    pub cost_with_notary: f64,
    pub monthly_payment: f64,
    pub monthly_insurance: f64,
    pub monthly_debt: f64,
    /// Monthly rent minus monthly debt service.
    pub rent_minus_debt: f64,
}

impl FinancingEstimate {
    pub fn compute(price: u64, monthly_rent: f64) -> Self {
        let cost_with_notary = price as f64 * (1.0 + NOTARY_FEE_RATE);
        let monthly_rate = LOAN_RATE_PCT / 100.0 / 12.0;
        let insurance_rate = LOAN_INSURANCE_PCT / 100.0 / 12.0;
        let months = (LOAN_YEARS * 12) as i32;

        let (monthly_payment, monthly_insurance) = if price > 0 {
            let growth = (1.0 + monthly_rate).powi(months);
            (
                cost_with_notary * monthly_rate * growth / (growth - 1.0),
                cost_with_notary * insurance_rate,
            )
        } else {
            (0.0, 0.0)
        };
        let monthly_debt = monthly_payment + monthly_insurance;

        Self {
            cost_with_notary,
            monthly_payment,
            monthly_insurance,
            monthly_debt,
            rent_minus_debt: monthly_rent - monthly_debt,
        }
    }
}
