//! Investment advice on a cached listing, from an external text service.

pub mod groq;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::ListingCache;
use crate::extractor::ListingExtractor;
use crate::fetcher::PageFetcher;
use crate::models::{Annotation, FinancingEstimate, ListingRecord};
use crate::utils::error::{AdvisorError, AppError};

pub use groq::GroqAdvisor;

/// At most this many characters of the ad body go into a prompt.
pub const AD_TEXT_LIMIT: usize = 2_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Buy,
    Negotiate,
    Avoid,
}

impl Verdict {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_uppercase().as_str() {
            "ACHETER" => Some(Verdict::Buy),
            "NEGOCIER" => Some(Verdict::Negotiate),
            "EVITER" => Some(Verdict::Avoid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Rating {
    VeryGood,
    Good,
    Average,
    Poor,
}

impl Rating {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_uppercase().as_str() {
            "TRES_BONNE" => Some(Rating::VeryGood),
            "BONNE" => Some(Rating::Good),
            "MOYENNE" => Some(Rating::Average),
            "MAUVAISE" => Some(Rating::Poor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Advice {
    pub verdict: Verdict,
    pub rating: Rating,
    /// Out of 10.
    pub score: f64,
    /// The full text returned by the service.
    pub body: String,
}

#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn generate_advice(
        &self,
        record: &ListingRecord,
        ad_text: Option<&str>,
    ) -> Result<Advice, AdvisorError>;
}

fn tag_regex(tag: &str, value: &str) -> Regex {
    Regex::new(&format!(r"(?i)\*{{0,2}}{}\*{{0,2}}\s*:\s*{}", tag, value)).expect("valid advice tag pattern")
}

/// Read the `VERDICT`, `AVIS` and `SCORE` trailer of an advice text.
pub fn parse_advice(body: &str) -> Result<Advice, AdvisorError> {
    let missing = |tag: &str| AdvisorError::Format {
        tag: tag.to_string(),
        body: body.to_string(),
    };

    let verdict = tag_regex("VERDICT", "(ACHETER|NEGOCIER|EVITER)")
        .captures(body)
        .and_then(|caps| Verdict::from_tag(&caps[1]))
        .ok_or_else(|| missing("VERDICT"))?;

    let rating = tag_regex("AVIS", "(TRES_BONNE|BONNE|MOYENNE|MAUVAISE)")
        .captures(body)
        .and_then(|caps| Rating::from_tag(&caps[1]))
        .ok_or_else(|| missing("AVIS"))?;

    let score = tag_regex("SCORE", r"(\d+(?:[,.]\d+)?)\s*/\s*10")
        .captures(body)
        .and_then(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
        .filter(|score| (0.0..=10.0).contains(score))
        .ok_or_else(|| missing("SCORE"))?;

    Ok(Advice {
        verdict,
        rating,
        score,
        body: body.to_string(),
    })
}

/// The figures the service is asked to reason about, plus the ad body if any.
pub fn build_prompt(record: &ListingRecord, ad_text: Option<&str>) -> String {
    let price = record.price.unwrap_or(0);
    let monthly_rent = record.monthly_rent.unwrap_or(0.0);
    let financing = FinancingEstimate::compute(price, monthly_rent);

    let yields = match (record.gross_yield_pct, record.net_yield_pct) {
        (Some(gross), Some(net)) => format!("Rendement brut: {:.2}%\nRendement net: {:.2}%\n", gross, net),
        (Some(gross), None) => format!("Rendement brut: {:.2}%\n", gross),
        _ => String::new(),
    };

    let ad_section = ad_text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| {
            let excerpt: String = text.chars().take(AD_TEXT_LIMIT).collect();
            format!("\n=== CONTENU DE L'ANNONCE ===\n{}\n", excerpt)
        })
        .unwrap_or_default();

    format!(
        "Tu es un expert en investissement immobilier locatif en France, \
         specialise dans les petites surfaces en zone urbaine.\n\
         Analyse l'annonce ci-dessous pour un investisseur. \
         N'effectue aucun calcul financier : utilise uniquement les valeurs fournies.\n\n\
         === DONNEES DE L'ANNONCE ===\n\
         Bien immobilier: {title}\n\
         Prix d'achat: {price}€\n\
         Prix avec frais de notaire (7.5%): {cost:.2}€\n\
         Loyer mensuel: {rent:.2}€\n\
         Loyer annuel: {annual:.2}€\n\
         Charges annuelles: {charges:.2}€\n\
         Taxe fonciere annuelle: {tax:.2}€\n\
         {yields}\n\
         FINANCEMENT (20 ans, 3.09% + 0.15% assurance):\n\
         Mensualite emprunt: {debt:.2}€\n\
         Difference loyer - emprunt: {margin:.2}€\n\
         {ad_section}\n\
         === TA MISSION ===\n\
         1. Resume le bien en une phrase.\n\
         2. Juge la coherence du prix sans inventer de chiffres.\n\
         3. Liste les points positifs pour la location.\n\
         4. Liste les risques (juridiques, techniques, locatifs, copropriete).\n\
         5. Commente la rentabilite et le cashflow fournis.\n\
         6. Conclus par une recommandation claire.\n\n\
         === FORMAT DE SORTIE OBLIGATOIRE ===\n\
         Termine par exactement ces 3 lignes :\n\
         VERDICT: [ACHETER|NEGOCIER|EVITER]\n\
         AVIS: [TRES_BONNE|BONNE|MOYENNE|MAUVAISE]\n\
         SCORE: X/10\n",
        title = record.title,
        cost = financing.cost_with_notary,
        rent = monthly_rent,
        annual = record.annual_rent.unwrap_or(monthly_rent * 12.0),
        charges = record.annual_charges.unwrap_or(0.0),
        tax = record.annual_property_tax.unwrap_or(0.0),
        debt = financing.monthly_debt,
        margin = financing.rent_minus_debt,
    )
}

/// What `advise_listing` stored.
#[derive(Debug, Clone)]
pub struct AdviceOutcome {
    pub record: ListingRecord,
    /// The text stored as `analysis_ai`.
    pub body: String,
    /// `None` when the text has no readable verdict trailer.
    pub advice: Option<Advice>,
}

/// Ask `service` about the listing at `url` and store its answer in `cache`.
///
/// A listing that is not cached yet is extracted from its page and added
/// first. The advice text is stored even when its trailer cannot be read.
pub async fn advise_listing<F, S>(
    fetcher: &F,
    service: &S,
    cache: &mut ListingCache,
    url: &str,
) -> crate::Result<AdviceOutcome>
where
    F: PageFetcher,
    S: AdvisoryService + ?Sized,
{
    let extractor = ListingExtractor::new();

    let page = match fetcher.fetch(url, 0).await {
        Ok(html) => Some(html),
        Err(e) if cache.contains(url) => {
            warn!("Could not fetch the ad text, advising on figures only: {}", e);
            None
        }
        Err(e) => return Err(e.into()),
    };

    if !cache.contains(url) {
        if let Some(html) = page.as_deref() {
            let mut record = extractor.extract(url, html)?;
            record.scraped_at = Some(Utc::now());
            info!("Added {} to the cache", url);
            cache.upsert(record);
        }
    }

    let record = cache.get(url).cloned().ok_or_else(|| AppError::NotFound {
        resource: url.to_string(),
    })?;
    let ad_text = page.as_deref().map(|html| extractor.ad_text(html));

    let (body, advice) = match service.generate_advice(&record, ad_text.as_deref()).await {
        Ok(advice) => (advice.body.clone(), Some(advice)),
        Err(AdvisorError::Format { tag, body }) => {
            warn!("Advice has no readable {} line, storing it as is", tag);
            (body, None)
        }
        Err(e) => return Err(e.into()),
    };

    cache.annotate(url, Annotation::Analysis(body.clone()));
    cache.save()?;

    Ok(AdviceOutcome {
        record,
        body,
        advice,
    })
}
