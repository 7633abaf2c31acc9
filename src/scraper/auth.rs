//! Portal login: homepage → modal → embedded login frame → submit → verify.

use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::wait::{probe_failure, wait_for_selector, Poll};
use crate::browser::{BrowserError, PageDriver};
use crate::config::{AuthConfig, Credentials, PortalConfig};
use crate::utils::mask_identity;

// ── States ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    HomeLoaded,
    ModalTriggered,
    ModalPresent,
    FrameAccessed,
    CredentialsSubmitted,
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HomeLoaded => "home-loaded",
            Self::ModalTriggered => "modal-triggered",
            Self::ModalPresent => "modal-present",
            Self::FrameAccessed => "frame-accessed",
            Self::CredentialsSubmitted => "credentials-submitted",
            Self::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("homepage failed to load: {0}")]
    HomeLoad(#[source] BrowserError),

    #[error("login trigger `{0}` not found")]
    TriggerMissing(String),

    #[error("login modal `{selector}` did not appear within {}ms", .timeout.as_millis())]
    ModalTimeout { selector: String, timeout: Duration },

    #[error("login frame `{0}` not found")]
    FrameNotFound(String),

    #[error("login frame `{0}` content is not accessible")]
    FrameDetached(String),

    #[error("login form interaction failed: {0}")]
    Form(String),

    #[error("login frame evaluation failed: {0}")]
    Evaluation(String),

    #[error("login not confirmed within {}ms", .timeout.as_millis())]
    NotVerified { timeout: Duration },

    #[error("browser error while reaching {state}: {source}")]
    Browser {
        state: AuthState,
        #[source]
        source: BrowserError,
    },
}

impl AuthError {
    /// The state the flow was trying to reach when it failed.
    pub fn state(&self) -> AuthState {
        match self {
            Self::HomeLoad(_) => AuthState::HomeLoaded,
            Self::TriggerMissing(_) => AuthState::ModalTriggered,
            Self::ModalTimeout { .. } => AuthState::ModalPresent,
            Self::FrameNotFound(_) | Self::FrameDetached(_) => AuthState::FrameAccessed,
            Self::Form(_) | Self::Evaluation(_) => AuthState::CredentialsSubmitted,
            Self::NotVerified { .. } => AuthState::Authenticated,
            Self::Browser { state, .. } => *state,
        }
    }
}

/// Reply of the in-frame login script.
#[derive(Debug, Deserialize)]
struct LoginOutcome {
    success: bool,
    #[serde(default)]
    reason: Option<String>,
}

const LOGIN_JS: &str = r#"((args) => {
  try {
    const fill = (input, value) => {
      input.value = value;
      input.dispatchEvent(new Event('input', { bubbles: true }));
      input.dispatchEvent(new Event('change', { bubbles: true }));
    };
    const form = document.querySelector(args.form);
    if (!form) return { success: false, reason: 'Login form not found' };
    const email = form.querySelector(args.email);
    if (!email) return { success: false, reason: 'Email input not found' };
    const password = form.querySelector(args.password);
    if (!password) return { success: false, reason: 'Password input not found' };
    fill(email, args.username);
    fill(password, args.secret);
    const button = form.querySelector(args.submit);
    if (!button) return { success: false, reason: 'Login button not found' };
    button.classList.remove(args.disabledClass);
    button.removeAttribute('disabled');
    button.click();
    return { success: true };
  } catch (e) {
    return { success: false, reason: 'Error in iframe evaluation: ' + (e && e.message) };
  }
})(__ARGS__)"#;

// ── Authenticator ─────────────────────────────────────────────────────────────

pub struct Authenticator<'a> {
    portal: &'a PortalConfig,
    auth: &'a AuthConfig,
    credentials: &'a Credentials,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        portal: &'a PortalConfig,
        auth: &'a AuthConfig,
        credentials: &'a Credentials,
    ) -> Self {
        Self { portal, auth, credentials }
    }

    /// Drive the page through the login flow. The page is left on whatever
    /// the portal shows after login; on error nothing has been scraped.
    pub async fn login<D: PageDriver + ?Sized>(&self, page: &mut D) -> Result<(), AuthError> {
        // ── HomeLoaded
        page.goto(&self.portal.home_url, self.portal.nav_timeout())
            .await
            .map_err(AuthError::HomeLoad)?;
        info!("Homepage loaded ({})", self.portal.home_url);

        // ── ModalTriggered
        let clicked = page
            .click(&self.auth.login_trigger)
            .await
            .map_err(|source| AuthError::Browser { state: AuthState::ModalTriggered, source })?;
        if clicked {
            info!("Clicked log-in link");
        } else if self.auth.require_login_trigger {
            return Err(AuthError::TriggerMissing(self.auth.login_trigger.clone()));
        } else {
            warn!(
                "Log-in link `{}` not found, waiting for the modal anyway",
                self.auth.login_trigger
            );
        }
        self.settle().await;

        // ── ModalPresent
        let modal_timeout = Duration::from_millis(self.auth.modal_timeout_ms);
        let appeared = wait_for_selector(page, &self.auth.modal_selector, modal_timeout)
            .await
            .map_err(|source| AuthError::Browser { state: AuthState::ModalPresent, source })?;
        if !appeared {
            return Err(AuthError::ModalTimeout {
                selector: self.auth.modal_selector.clone(),
                timeout: modal_timeout,
            });
        }
        info!("Login modal appeared");

        // ── FrameAccessed
        let frame = page
            .resolve_frame(&self.auth.frame_selector)
            .await
            .map_err(|e| match e {
                BrowserError::ElementNotFound(sel) => AuthError::FrameNotFound(sel),
                BrowserError::FrameUnavailable(sel) => AuthError::FrameDetached(sel),
                source => AuthError::Browser { state: AuthState::FrameAccessed, source },
            })?;
        info!("Accessed login frame content");

        // ── CredentialsSubmitted
        let reply = page
            .evaluate_in_frame(&frame, &self.login_script())
            .await
            .map_err(|e| AuthError::Evaluation(e.to_string()))?;
        let outcome: LoginOutcome = serde_json::from_value(reply)
            .map_err(|e| AuthError::Evaluation(format!("unexpected login reply: {}", e)))?;
        if !outcome.success {
            let reason = outcome.reason.unwrap_or_else(|| "unknown reason".to_string());
            return Err(AuthError::Form(reason));
        }
        info!("Filled login form as {} and submitted", mask_identity(&self.credentials.username));
        self.settle().await;

        // ── Authenticated
        self.verify(page, clicked).await?;
        info!("Login confirmed");
        Ok(())
    }

    fn login_script(&self) -> String {
        let args = json!({
            "form": self.auth.form_selector,
            "email": field_selector(&self.auth.email_field),
            "password": field_selector(&self.auth.password_field),
            "submit": self.auth.submit_selector,
            "disabledClass": self.auth.disabled_class,
            "username": self.credentials.username,
            "secret": self.credentials.password,
        });
        LOGIN_JS.replace("__ARGS__", &args.to_string())
    }

    /// Logged in once the configured indicator shows up, or, without one,
    /// once the log-in link we clicked is gone from the page. Probes that fail
    /// while the post-submit reload replaces the document are retried.
    async fn verify<D: PageDriver + ?Sized>(
        &self,
        page: &mut D,
        trigger_clicked: bool,
    ) -> Result<(), AuthError> {
        let timeout = Duration::from_millis(self.auth.verify_timeout_ms);
        let (selector, wanted) = match &self.auth.logged_in_selector {
            Some(sel) => (sel.as_str(), true),
            None if trigger_clicked => (self.auth.login_trigger.as_str(), false),
            None => {
                warn!(
                    "Log-in link was never on the page and no logged_in_selector is set; \
                     cannot confirm login"
                );
                return Err(AuthError::NotVerified { timeout });
            }
        };
        let browser_error =
            |source: BrowserError| AuthError::Browser { state: AuthState::Authenticated, source };

        let mut poll = Poll::new(timeout);
        loop {
            let failure = match page.exists(selector).await {
                Ok(present) if present == wanted => return Ok(()),
                Ok(_) => None,
                Err(e) => Some(probe_failure(selector, e).map_err(browser_error)?),
            };
            if !poll.tick().await {
                return Err(match failure {
                    Some(source) => browser_error(source),
                    None => AuthError::NotVerified { timeout },
                });
            }
            debug!("Waiting for login to take effect");
        }
    }

    async fn settle(&self) {
        if self.auth.settle_ms > 0 {
            sleep(Duration::from_millis(self.auth.settle_ms)).await;
        }
    }
}

fn field_selector(name: &str) -> String {
    format!("input[name={}]", serde_json::Value::String(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;

    fn fast_auth() -> AuthConfig {
        AuthConfig {
            modal_timeout_ms: 60,
            verify_timeout_ms: 60,
            settle_ms: 0,
            ..AuthConfig::default()
        }
    }

    fn creds() -> Credentials {
        Credentials {
            username: "trader@example.com".into(),
            password: "p\"ss'word".into(),
        }
    }

    async fn login(page: &mut FakePage, auth: &AuthConfig) -> Result<(), AuthError> {
        let portal = PortalConfig::default();
        let creds = creds();
        Authenticator::new(&portal, auth, &creds).login(page).await
    }

    #[tokio::test]
    async fn happy_path_reaches_authenticated() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);

        login(&mut page, &auth).await.unwrap();

        assert_eq!(page.visited, vec![PortalConfig::default().home_url]);
        assert_eq!(page.clicks, vec![auth.login_trigger.clone()]);
        assert_eq!(page.frame_scripts.len(), 1);
        let script = &page.frame_scripts[0];
        assert!(script.contains(r#""username":"trader@example.com""#));
        assert!(script.contains(r#"input[name=\"email\"]"#));
        assert!(script.contains(r#"input[name=\"pwd\"]"#));
        assert!(!script.contains("__ARGS__"));
    }

    #[tokio::test]
    async fn homepage_failure_is_fatal() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.pages.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::HomeLoad(_)));
        assert_eq!(err.state(), AuthState::HomeLoaded);
        assert!(page.clicks.is_empty());
    }

    #[tokio::test]
    async fn missing_trigger_falls_through_to_modal_wait() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.present.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::ModalTimeout { .. }));
        assert_eq!(err.state(), AuthState::ModalPresent);
    }

    #[tokio::test]
    async fn missing_trigger_fails_fast_when_required() {
        let auth = AuthConfig { require_login_trigger: true, ..fast_auth() };
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.present.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::TriggerMissing(_)));
        assert!(page.frame_scripts.is_empty());
    }

    #[tokio::test]
    async fn modal_never_appearing_is_fatal() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.reveal_on_click.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::ModalTimeout { .. }));
        assert!(page.frame_scripts.is_empty());
    }

    #[tokio::test]
    async fn missing_or_detached_frame_is_fatal() {
        let auth = fast_auth();
        let home = PortalConfig::default().home_url;

        let mut page = FakePage::happy(&auth, &home);
        page.frame_selector = None;
        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::FrameNotFound(ref s) if s == "iframe#myframe"));

        let mut page = FakePage::happy(&auth, &home);
        page.frame_detached = true;
        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::FrameDetached(_)));
        assert_eq!(err.state(), AuthState::FrameAccessed);
    }

    #[tokio::test]
    async fn form_reason_is_surfaced() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.login_reply = json!({ "success": false, "reason": "Password input not found" });

        let err = login(&mut page, &auth).await.unwrap_err();
        assert_eq!(err.to_string(), "login form interaction failed: Password input not found");
        assert_eq!(err.state(), AuthState::CredentialsSubmitted);
    }

    #[tokio::test]
    async fn frame_exception_becomes_failure() {
        let auth = fast_auth();
        let home = PortalConfig::default().home_url;

        let mut page = FakePage::happy(&auth, &home);
        page.login_throws = Some("Execution context was destroyed".into());
        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::Evaluation(ref m) if m.contains("context was destroyed")));

        let mut page = FakePage::happy(&auth, &home);
        page.login_reply = serde_json::Value::Null;
        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::Evaluation(_)));
    }

    #[tokio::test]
    async fn submission_without_effect_is_not_verified() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.hide_on_login.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::NotVerified { .. }));
        assert_eq!(err.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn configured_indicator_confirms_login() {
        let auth = AuthConfig {
            logged_in_selector: Some("a.userlogout".into()),
            ..fast_auth()
        };
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.hide_on_login.clear();
        page.show_on_login.push("a.userlogout".into());

        login(&mut page, &auth).await.unwrap();
    }

    #[tokio::test]
    async fn reload_after_submit_does_not_abort_verification() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.reload_probes = 1;

        login(&mut page, &auth).await.unwrap();
        assert_eq!(page.failing_probes, 0);
    }

    #[tokio::test]
    async fn page_that_never_recovers_from_reload_fails_verification() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.reload_probes = usize::MAX;

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::Browser { state: AuthState::Authenticated, .. }));
    }

    #[tokio::test]
    async fn login_without_trigger_or_indicator_is_not_verified() {
        let auth = fast_auth();
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.present.clear();
        page.present.insert(auth.modal_selector.clone());
        page.hide_on_login.clear();

        let err = login(&mut page, &auth).await.unwrap_err();
        assert!(matches!(err, AuthError::NotVerified { .. }));
        assert_eq!(page.frame_scripts.len(), 1);
    }

    #[tokio::test]
    async fn login_without_trigger_uses_configured_indicator() {
        let auth = AuthConfig {
            logged_in_selector: Some("a.userlogout".into()),
            ..fast_auth()
        };
        let mut page = FakePage::happy(&auth, &PortalConfig::default().home_url);
        page.present.clear();
        page.present.insert(auth.modal_selector.clone());
        page.show_on_login.push("a.userlogout".into());

        login(&mut page, &auth).await.unwrap();
    }
}
