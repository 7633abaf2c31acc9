//! Scripted in-memory tab for exercising the login flow and pipeline.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{BrowserError, FrameContext, PageDriver};
use crate::config::AuthConfig;

#[derive(Debug, Default)]
pub struct FakePage {
    /// url → markup served after a successful `goto`
    pub pages: HashMap<String, String>,
    /// urls whose navigation times out
    pub timeouts: HashSet<String>,
    /// selectors currently matching something in the top document
    pub present: HashSet<String>,
    /// clicking the key makes the value start matching
    pub reveal_on_click: HashMap<String, String>,
    pub frame_selector: Option<String>,
    pub frame_detached: bool,
    pub login_reply: Value,
    pub login_throws: Option<String>,
    /// selectors that stop matching once a login reports success
    pub hide_on_login: Vec<String>,
    /// selectors that start matching once a login reports success
    pub show_on_login: Vec<String>,
    /// `exists` probes that fail as if the document were being replaced
    pub failing_probes: usize,
    /// probes to fail right after a successful login, like a post-submit reload
    pub reload_probes: usize,

    pub current: Option<String>,
    pub visited: Vec<String>,
    pub clicks: Vec<String>,
    pub frame_scripts: Vec<String>,
    pub close_calls: usize,
}

impl FakePage {
    /// A portal where every login step succeeds.
    pub fn happy(auth: &AuthConfig, home_url: &str) -> Self {
        let mut page = Self::default();
        page.pages.insert(home_url.to_string(), "<html><body>home</body></html>".into());
        page.present.insert(auth.login_trigger.clone());
        page.reveal_on_click
            .insert(auth.login_trigger.clone(), auth.modal_selector.clone());
        page.frame_selector = Some(auth.frame_selector.clone());
        page.login_reply = json!({ "success": true });
        page.hide_on_login.push(auth.login_trigger.clone());
        page
    }

    pub fn closed(&self) -> bool {
        self.close_calls > 0
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.visited.push(url.to_string());
        if self.timeouts.contains(url) {
            return Err(BrowserError::Timeout { url: url.to_string(), timeout });
        }
        if !self.pages.contains_key(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let url = self.current.as_ref().ok_or(BrowserError::Closed)?;
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Value, BrowserError> {
        Ok(Value::Null)
    }

    async fn resolve_frame(&mut self, selector: &str) -> Result<FrameContext, BrowserError> {
        if self.frame_selector.as_deref() != Some(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        if self.frame_detached {
            return Err(BrowserError::FrameUnavailable(selector.to_string()));
        }
        Ok(FrameContext { selector: selector.to_string(), context_id: 7 })
    }

    async fn evaluate_in_frame(
        &mut self,
        frame: &FrameContext,
        script: &str,
    ) -> Result<Value, BrowserError> {
        assert_eq!(frame.context_id, 7);
        self.frame_scripts.push(script.to_string());
        if let Some(msg) = &self.login_throws {
            return Err(BrowserError::Script(msg.clone()));
        }
        if self.login_reply.get("success").and_then(Value::as_bool) == Some(true) {
            for sel in &self.hide_on_login {
                self.present.remove(sel);
            }
            self.present.extend(self.show_on_login.iter().cloned());
            self.failing_probes += self.reload_probes;
        }
        Ok(self.login_reply.clone())
    }

    async fn close(&mut self) {
        self.close_calls += 1;
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError> {
        if self.failing_probes > 0 {
            self.failing_probes -= 1;
            return Err(BrowserError::Script("Execution context was destroyed".into()));
        }
        Ok(self.present.contains(selector))
    }

    async fn click(&mut self, selector: &str) -> Result<bool, BrowserError> {
        self.clicks.push(selector.to_string());
        if !self.present.contains(selector) {
            return Ok(false);
        }
        if let Some(revealed) = self.reveal_on_click.get(selector) {
            self.present.insert(revealed.clone());
        }
        Ok(true)
    }
}
