//! The fixed company list and its quote-page URLs.

use crate::models::Target;
use anyhow::{anyhow, Context, Result};
use url::Url;

pub const COMPANIES: &[Target] = &[
    Target {
        name: "Reliance Industries Limited",
        ticker: "RI",
        slug: "relianceindustries",
        sector: "refineries",
    },
    Target {
        name: "Tata Consultancy Services Limited",
        ticker: "TCS",
        slug: "tataconsultancyservices",
        sector: "computers-software",
    },
    Target {
        name: "Infosys Limited",
        ticker: "IT",
        slug: "infosys",
        sector: "computers-software",
    },
    Target {
        name: "HDFC Bank Limited",
        ticker: "HDF01",
        slug: "hdfcbank",
        sector: "banks-private-sector",
    },
    Target {
        name: "ICICI Bank Limited",
        ticker: "ICI02",
        slug: "icicibank",
        sector: "banks-private-sector",
    },
    Target {
        name: "Hindustan Unilever Limited",
        ticker: "HU",
        slug: "hindustanunilever",
        sector: "personal-care",
    },
    Target {
        name: "State Bank of India",
        ticker: "SBI",
        slug: "statebankindia",
        sector: "banks-public-sector",
    },
    Target {
        name: "Kotak Mahindra Bank Limited",
        ticker: "KMB",
        slug: "kotakmahindrabank",
        sector: "banks-private-sector",
    },
    Target {
        name: "ITC Limited",
        ticker: "ITC",
        slug: "itc",
        sector: "diversified",
    },
    Target {
        name: "Larsen & Toubro Limited",
        ticker: "LT",
        slug: "larsentoubro",
        sector: "infrastructure-general",
    },
];

/// `{base}/{sector}/{slug}/{ticker}`, e.g.
/// `https://www.moneycontrol.com/india/stockpricequote/refineries/relianceindustries/RI`
pub fn quote_url(base: &str, target: &Target) -> Result<String> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid quote base URL {:?}", base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Quote base URL {:?} cannot carry a path", base))?
        .pop_if_empty()
        .extend([target.sector, target.slug, target.ticker]);

    Ok(url.into())
}
