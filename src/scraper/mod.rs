pub mod auth;
pub mod swot;

use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::{BrowserError, PageDriver};
use crate::config::PortalConfig;
use crate::models::{SwotCounts, Target};
use crate::targets::quote_url;

use self::swot::extract_swot_counts;

/// Navigate and hand back the rendered markup.
pub async fn fetch<D: PageDriver + ?Sized>(
    page: &mut D,
    url: &str,
    timeout: Duration,
) -> Result<String, BrowserError> {
    page.goto(url, timeout).await?;
    debug!("Navigated to {}", url);
    page.content().await
}

// ── Quote page scraper ────────────────────────────────────────────────────────

pub struct QuotePageScraper {
    base_url: String,
    timeout: Duration,
}

impl QuotePageScraper {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            base_url: config.quote_base_url.trim_end_matches('/').to_string(),
            timeout: config.nav_timeout(),
        }
    }

    /// SWOT counts for one target. Any failure degrades to all zeros.
    pub async fn fetch_counts<D: PageDriver + ?Sized>(
        &self,
        page: &mut D,
        target: &Target,
    ) -> SwotCounts {
        let url = match quote_url(&self.base_url, target) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}: {:#}", target.ticker, e);
                return SwotCounts::default();
            }
        };

        match fetch(page, &url, self.timeout).await {
            Ok(html) => extract_swot_counts(&html),
            Err(e) => {
                warn!("{}: error fetching {}: {}", target.ticker, url, e);
                SwotCounts::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;
    use crate::targets::COMPANIES;

    const SWOT_HTML: &str = r#"<ul class="clearfix">
        <li class="swotliClass"><a><strong>Strengths (9)</strong></a></li>
        <li class="swotliClass"><a><strong>Weaknesses (2)</strong></a></li>
        <li class="swotliClass"><a><strong>Opportunities (4)</strong></a></li>
        <li class="swotliClass"><a><strong>Threats (1)</strong></a></li>
    </ul>"#;

    #[tokio::test]
    async fn fetch_returns_rendered_markup() {
        let mut page = FakePage::default();
        page.pages.insert("https://example.com/a".into(), "<p>a</p>".into());

        let html = fetch(&mut page, "https://example.com/a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(html, "<p>a</p>");
    }

    #[tokio::test]
    async fn fetch_reports_navigation_failure() {
        let mut page = FakePage::default();
        page.timeouts.insert("https://example.com/slow".into());

        let err = fetch(&mut page, "https://example.com/slow", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BrowserError::Timeout { .. }));
    }

    #[tokio::test]
    async fn fetch_counts_builds_url_and_extracts() {
        let scraper = QuotePageScraper::new(&PortalConfig::default());
        let mut page = FakePage::default();
        let url = "https://www.moneycontrol.com/india/stockpricequote/computers-software/infosys/IT";
        page.pages.insert(url.into(), SWOT_HTML.into());

        let counts = scraper.fetch_counts(&mut page, &COMPANIES[2]).await;
        assert_eq!(page.visited, vec![url.to_string()]);
        assert_eq!(counts, SwotCounts { strengths: 9, weaknesses: 2, opportunities: 4, threats: 1 });
    }

    #[tokio::test]
    async fn fetch_counts_degrades_on_navigation_error() {
        let scraper = QuotePageScraper::new(&PortalConfig::default());
        let mut page = FakePage::default();

        let counts = scraper.fetch_counts(&mut page, &COMPANIES[0]).await;
        assert!(counts.is_empty());
        assert_eq!(page.visited.len(), 1);
    }
}
