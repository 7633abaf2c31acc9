use crate::models::SwotCounts;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info};

/// The four SWOT tallies in page order: strengths, weaknesses, opportunities, threats.
pub const SWOT_SELECTOR: &str = "ul.clearfix li.swotliClass a strong";

const FIELDS: [&str; 4] = ["strengths", "weaknesses", "opportunities", "threats"];

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("count pattern is valid"));

/// Parse SWOT counts out of a rendered quote page.
///
/// Fewer than four matches yields all zeros; a single entry without a
/// parenthesized number zeroes only that field. Never fails.
pub fn extract_swot_counts(html: &str) -> SwotCounts {
    let Ok(sel) = Selector::parse(SWOT_SELECTOR) else {
        return SwotCounts::default();
    };

    let doc = Html::parse_document(html);
    let texts: Vec<String> = doc
        .select(&sel)
        .map(|el| el.text().collect::<String>())
        .collect();

    if texts.len() < FIELDS.len() {
        info!("Insufficient SWOT elements ({} of {})", texts.len(), FIELDS.len());
        return SwotCounts::default();
    }

    let mut values = [0u32; 4];
    for (i, text) in texts.iter().take(FIELDS.len()).enumerate() {
        match parse_count(text) {
            Some(n) => values[i] = n,
            None => info!("No count in {} entry {:?}, using 0", FIELDS[i], text.trim()),
        }
    }

    let counts = SwotCounts {
        strengths: values[0],
        weaknesses: values[1],
        opportunities: values[2],
        threats: values[3],
    };
    debug!("Extracted {:?}", counts);
    counts
}

/// First `(<digits>)` in `text`. "Strengths (12)" → 12
pub fn parse_count(text: &str) -> Option<u32> {
    COUNT_RE.captures(text)?.get(1)?.as_str().parse().ok()
}
