pub mod session;
pub mod wait;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use self::session::ChromeSession;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("no element matches `{0}`")]
    ElementNotFound(String),

    #[error("frame `{0}` has no accessible document")]
    FrameUnavailable(String),

    #[error("script failed: {0}")]
    Script(String),

    #[error("browser session is closed")]
    Closed,

    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// Execution context inside an embedded document, as resolved by
/// [`PageDriver::resolve_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameContext {
    pub selector: String,
    pub context_id: i64,
}

// ── Driver trait ──────────────────────────────────────────────────────────────

/// One browser tab. Every call mutates the tab's current document, so callers
/// drive it strictly one step at a time.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and block until the network-idle heuristic settles or `timeout` elapses.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Serialized markup of the current document.
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// Evaluate an expression in the top-level document and return its JSON value.
    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;

    async fn resolve_frame(&mut self, selector: &str) -> Result<FrameContext, BrowserError>;

    async fn evaluate_in_frame(
        &mut self,
        frame: &FrameContext,
        script: &str,
    ) -> Result<Value, BrowserError>;

    /// Release the browser. Safe to call more than once.
    async fn close(&mut self);

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let js = format!("document.querySelector({}) !== null", js_string(selector));
        Ok(self.evaluate(&js).await?.as_bool().unwrap_or(false))
    }

    /// Synthetic click on the first match. `Ok(false)` when nothing matches.
    async fn click(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(selector)
        );
        Ok(self.evaluate(&js).await?.as_bool().unwrap_or(false))
    }
}

/// Quote `s` as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    // JSON strings are valid JS string literals.
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_newlines() {
        assert_eq!(js_string("a.b"), r#""a.b""#);
        assert_eq!(js_string(r#"input[name="pwd"]"#), r#""input[name=\"pwd\"]""#);
        assert_eq!(js_string("x\ny"), r#""x\ny""#);
    }

    #[test]
    fn timeout_error_reports_millis() {
        let err = BrowserError::Timeout {
            url: "https://example.com".into(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "navigation to https://example.com timed out after 60000ms");
    }

    /// Implements only `evaluate`; `exists` and `click` come from the trait.
    #[derive(Default)]
    struct ScriptOnly {
        replies: Vec<Value>,
        scripts: Vec<String>,
    }

    #[async_trait]
    impl PageDriver for ScriptOnly {
        async fn goto(&mut self, _: &str, _: Duration) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn content(&mut self) -> Result<String, BrowserError> {
            Ok(String::new())
        }

        async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
            self.scripts.push(script.to_string());
            Ok(self.replies.pop().unwrap_or(Value::Null))
        }

        async fn resolve_frame(&mut self, _: &str) -> Result<FrameContext, BrowserError> {
            Err(BrowserError::Closed)
        }

        async fn evaluate_in_frame(
            &mut self,
            _: &FrameContext,
            _: &str,
        ) -> Result<Value, BrowserError> {
            Err(BrowserError::Closed)
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn exists_queries_the_document_with_a_quoted_selector() {
        let mut page = ScriptOnly {
            replies: vec![Value::Bool(true)],
            ..Default::default()
        };

        assert!(page.exists(r#"a[title="Log in"]"#).await.unwrap());
        assert_eq!(
            page.scripts,
            vec![r#"document.querySelector("a[title=\"Log in\"]") !== null"#.to_string()]
        );
    }

    #[tokio::test]
    async fn click_reports_whether_anything_was_clicked() {
        let mut page = ScriptOnly {
            replies: vec![Value::Bool(false), Value::Bool(true)],
            ..Default::default()
        };

        assert!(page.click("#LoginModal").await.unwrap());
        assert!(!page.click("#LoginModal").await.unwrap());
        assert!(page.scripts[0].contains(r##"document.querySelector("#LoginModal")"##));
        assert!(page.scripts[0].contains("el.click()"));
    }

    #[tokio::test]
    async fn non_boolean_replies_read_as_false() {
        let mut page = ScriptOnly {
            replies: vec![Value::Null, Value::String("yes".into())],
            ..Default::default()
        };

        assert!(!page.exists("div").await.unwrap());
        assert!(!page.click("div").await.unwrap());
    }
}
