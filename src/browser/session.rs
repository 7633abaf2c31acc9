//! Headless Chrome session over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::dom::DescribeNodeParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CreateIsolatedWorldParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::{Handler, Page};
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BrowserError, FrameContext, PageDriver};
use crate::config::BrowserConfig;

/// Masks the usual headless giveaways before any page script runs.
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
  window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters)
  );
}
"#;

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    idle: Duration,
    closed: bool,
}

impl ChromeSession {
    /// Launch Chrome, open one tab and give it a desktop identity.
    pub async fn launch(config: &BrowserConfig, idle: Duration) -> Result<Self, BrowserError> {
        let mut builder = CdpConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(config.request_timeout_secs))
            .launch_timeout(Duration::from_secs(config.launch_timeout_secs))
            .window_size(config.window_width, config.window_height)
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            // Keeps the login iframe in-process so its frame id is reachable from this tab.
            .arg("--disable-features=IsolateOrigins,site-per-process");

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(BrowserError::Launch)?;
        let (browser, handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler_task = spawn_handler_task(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e.into());
            }
        };

        let mut session = Self {
            browser,
            page,
            handler_task,
            idle,
            closed: false,
        };

        if let Err(e) = session.apply_identity(config).await {
            session.close().await;
            return Err(e);
        }

        info!("Browser launched (headless={})", config.headless);
        Ok(session)
    }

    async fn apply_identity(&self, config: &BrowserConfig) -> Result<(), BrowserError> {
        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(config.user_agent.clone())
            .accept_language(config.accept_language.clone())
            .build()
            .map_err(BrowserError::Launch)?;
        self.page.execute(ua).await?;

        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(identity_headers(config))))
            .await?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
            .await?;

        debug!("User agent, headers and stealth script applied");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    /// Document complete and the resource count unchanged for `idle`, or `deadline`.
    async fn wait_for_network_idle(&self, deadline: Instant) {
        let budget = deadline.saturating_duration_since(Instant::now());
        let js = format!(
            r#"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = {idle_ms};
                const interval = 100;
                const count = () => {{
                    try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }}
                }};
                const start = Date.now();
                let last = count();
                let stable = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const cur = count();
                    if (document.readyState === 'complete' && cur === last) {{
                        stable += interval;
                        if (stable >= idleMs) return {{ ok: true, resources: cur, waitedMs: Date.now() - start }};
                    }} else {{
                        stable = 0;
                    }}
                    last = cur;
                }}
                return {{ ok: false, resources: last, waitedMs: Date.now() - start }};
            }})()"#,
            timeout_ms = budget.as_millis(),
            idle_ms = self.idle.as_millis(),
        );

        match self.page.evaluate(js).await {
            Ok(res) => {
                let info: Value = res.into_value().unwrap_or(Value::Null);
                let ok = info.get("ok").and_then(Value::as_bool).unwrap_or(false);
                let waited = info.get("waitedMs").and_then(Value::as_u64).unwrap_or(0);
                if ok {
                    debug!("Network idle after {}ms", waited);
                } else {
                    debug!("Network never went idle ({}ms)", waited);
                }
            }
            Err(e) => warn!("Network-idle probe failed: {}", e),
        }
    }
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;

        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            self.wait_for_network_idle(deadline).await;
            Ok::<(), BrowserError>(())
        };

        match tokio::time::timeout_at(deadline, navigation).await {
            Ok(res) => res,
            Err(_) => Err(BrowserError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        Ok(self.page.content().await?)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        self.ensure_open()?;
        let res = self.page.evaluate(script).await?;
        // `undefined` has no JSON value.
        Ok(res.into_value().unwrap_or(Value::Null))
    }

    async fn resolve_frame(&mut self, selector: &str) -> Result<FrameContext, BrowserError> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;

        let described = self
            .page
            .execute(
                DescribeNodeParams::builder()
                    .backend_node_id(element.backend_node_id.clone())
                    .build(),
            )
            .await?;
        let frame_id = described
            .result
            .node
            .frame_id
            .clone()
            .ok_or_else(|| BrowserError::FrameUnavailable(selector.to_string()))?;

        let world = CreateIsolatedWorldParams::builder()
            .frame_id(frame_id)
            .world_name("swot-login")
            .build()
            .map_err(BrowserError::Script)?;
        let created = self
            .page
            .execute(world)
            .await
            .map_err(|e| {
                debug!("Isolated world for {} failed: {}", selector, e);
                BrowserError::FrameUnavailable(selector.to_string())
            })?;

        Ok(FrameContext {
            selector: selector.to_string(),
            context_id: *created.result.execution_context_id.inner(),
        })
    }

    async fn evaluate_in_frame(
        &mut self,
        frame: &FrameContext,
        script: &str,
    ) -> Result<Value, BrowserError> {
        self.ensure_open()?;
        let params = EvaluateParams::builder()
            .expression(script)
            .context_id(ExecutionContextId::new(frame.context_id))
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(BrowserError::Script)?;

        let resp = self.page.execute(params).await?;
        if let Some(ex) = &resp.result.exception_details {
            return Err(BrowserError::Script(format!("{} in {}", ex.text, frame.selector)));
        }
        Ok(resp.result.result.value.clone().unwrap_or(Value::Null))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process wait failed: {}", e);
        }
        self.handler_task.abort();
        info!("Browser session closed");
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Request headers a desktop browser sends on every navigation.
fn identity_headers(config: &BrowserConfig) -> Value {
    json!({
        "Accept-Language": config.accept_language,
        "Accept": config.accept,
    })
}

fn spawn_handler_task(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler event error: {}", e);
            }
        }
    })
}
