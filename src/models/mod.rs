use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

// ── Target ────────────────────────────────────────────────────────────────────

/// One equity to scrape. Identity is the ticker.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Target {
    pub name: &'static str,
    pub ticker: &'static str,
    pub slug: &'static str,    // "relianceindustries"
    pub sector: &'static str,  // "refineries"
}

// ── SWOT counts ───────────────────────────────────────────────────────────────

/// Strengths / weaknesses / opportunities / threats tallies. All-zero is the
/// "nothing usable on the page" value.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SwotCounts {
    pub strengths: u32,
    pub weaknesses: u32,
    pub opportunities: u32,
    pub threats: u32,
}

impl SwotCounts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Scrape record ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScrapeRecord {
    pub name: String,
    pub ticker: String,
    #[serde(flatten)]
    pub counts: SwotCounts,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeRecord {
    pub fn new(target: &Target, counts: SwotCounts, scraped_at: DateTime<Utc>) -> Self {
        Self {
            name: target.name.to_string(),
            ticker: target.ticker.to_string(),
            counts,
            scraped_at,
        }
    }

    /// ISO-8601 UTC with millisecond precision, e.g. `2024-03-01T09:15:00.123Z`.
    pub fn timestamp(&self) -> String {
        self.scraped_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

// ── Sheet rows ────────────────────────────────────────────────────────────────

pub const SHEET_HEADER: [&str; 6] = [
    "Name",
    "Strengths",
    "Weaknesses",
    "Opportunities",
    "Threats",
    "Timestamp",
];

pub type SheetRow = [String; 6];

/// Header row followed by one row per record, in record order.
pub fn sheet_rows(records: &[ScrapeRecord]) -> Vec<SheetRow> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(SHEET_HEADER.map(String::from));
    rows.extend(records.iter().map(|r| {
        [
            r.name.clone(),
            r.counts.strengths.to_string(),
            r.counts.weaknesses.to_string(),
            r.counts.opportunities.to_string(),
            r.counts.threats.to_string(),
            r.timestamp(),
        ]
    }));
    rows
}
