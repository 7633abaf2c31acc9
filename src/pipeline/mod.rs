//! Pipeline orchestrator: login once, then scrape every target on the same tab.
//!
//! `run()` owns the session for its whole duration:
//!   1. Authenticate against the portal homepage. Any failure ends the run
//!      with no records; nothing is fetched without a confirmed login.
//!   2. Visit each target's quote page in list order and extract SWOT counts.
//!      Per-target failures become all-zero records, never an abort.
//!   3. Close the session, whichever way step 1 or 2 ended.

use crate::browser::PageDriver;
use crate::config::{AppConfig, Credentials};
use crate::models::{ScrapeRecord, Target};
use crate::scraper::auth::Authenticator;
use crate::scraper::QuotePageScraper;
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::jitter;
use tracing::{error, info, warn};

pub struct Pipeline {
    config: AppConfig,
    credentials: Credentials,
}

impl Pipeline {
    pub fn new(config: AppConfig, credentials: Credentials) -> Self {
        Self { config, credentials }
    }

    pub async fn run<D: PageDriver + ?Sized>(
        &self,
        page: &mut D,
        targets: &[Target],
    ) -> Vec<ScrapeRecord> {
        let records = self.scrape(page, targets).await;
        page.close().await;
        records
    }

    async fn scrape<D: PageDriver + ?Sized>(
        &self,
        page: &mut D,
        targets: &[Target],
    ) -> Vec<ScrapeRecord> {
        // ── 1. Login ──────────────────────────────────────────────────────────
        info!("=== Step 1: Logging in ===");
        let auth = Authenticator::new(&self.config.portal, &self.config.auth, &self.credentials);
        if let Err(e) = auth.login(page).await {
            error!("Login failed at {}: {}", e.state(), e);
            return Vec::new();
        }

        // ── 2. Quote pages ────────────────────────────────────────────────────
        info!("=== Step 2: Scraping {} targets ===", targets.len());
        let scraper = QuotePageScraper::new(&self.config.portal);
        let mut records = Vec::with_capacity(targets.len());
        let mut empty = 0usize;

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.polite_delay().await;
            }

            let counts = scraper.fetch_counts(page, target).await;
            if counts.is_empty() {
                warn!("{}: no SWOT data, recording zeros", target.ticker);
                empty += 1;
            } else {
                info!(
                    "{}: S={} W={} O={} T={}",
                    target.ticker,
                    counts.strengths,
                    counts.weaknesses,
                    counts.opportunities,
                    counts.threats
                );
            }

            records.push(ScrapeRecord::new(target, counts, Utc::now()));
        }

        info!(
            "=== Done: {} targets | {} with data | {} empty ===",
            records.len(),
            records.len() - empty,
            empty
        );
        records
    }

    /// Configured pause plus random jitter between quote pages.
    async fn polite_delay(&self) {
        let portal = &self.config.portal;
        let total = Duration::from_millis(portal.request_delay_ms)
            + jitter(Duration::from_millis(portal.jitter_ms));
        if !total.is_zero() {
            sleep(total).await;
        }
    }
}
