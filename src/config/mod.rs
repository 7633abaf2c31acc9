use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Headless browser launch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// `Accept` header sent with every request
    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Where the portal lives and how patiently we load it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    #[serde(default = "default_home_url")]
    pub home_url: String,

    #[serde(default = "default_quote_base_url")]
    pub quote_base_url: String,

    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Quiet window the network-idle heuristic waits for after load
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    #[serde(default)]
    pub request_delay_ms: u64,

    #[serde(default)]
    pub jitter_ms: u64,
}

/// Login flow: credentials, selectors and readiness timeouts
#[derive(Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_login_trigger")]
    pub login_trigger: String,

    #[serde(default = "default_modal_selector")]
    pub modal_selector: String,

    #[serde(default = "default_frame_selector")]
    pub frame_selector: String,

    #[serde(default = "default_form_selector")]
    pub form_selector: String,

    #[serde(default = "default_email_field")]
    pub email_field: String,

    #[serde(default = "default_password_field")]
    pub password_field: String,

    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,

    #[serde(default = "default_disabled_class")]
    pub disabled_class: String,

    #[serde(default)]
    pub logged_in_selector: Option<String>,

    #[serde(default)]
    pub require_login_trigger: bool,

    #[serde(default = "default_modal_timeout_ms")]
    pub modal_timeout_ms: u64,

    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Csv,
    Duckdb,
}

/// Result sink destination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,

    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential `{0}` (set SWOT__AUTH__{1} or MC_{1})")]
    MissingCredential(&'static str, &'static str),

    #[error("sink destination is empty for kind {0:?}")]
    EmptyDestination(SinkKind),
}

/// Login identifier and secret, resolved once per run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("login_trigger", &self.login_trigger)
            .field("modal_selector", &self.modal_selector)
            .field("frame_selector", &self.frame_selector)
            .field("logged_in_selector", &self.logged_in_selector)
            .field("require_login_trigger", &self.require_login_trigger)
            .finish_non_exhaustive()
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}
fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string()
}
fn default_window_width() -> u32 {
    1366
}
fn default_window_height() -> u32 {
    900
}
fn default_launch_timeout_secs() -> u64 {
    30
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_home_url() -> String {
    "https://www.moneycontrol.com".to_string()
}
fn default_quote_base_url() -> String {
    "https://www.moneycontrol.com/india/stockpricequote".to_string()
}
fn default_nav_timeout_ms() -> u64 {
    60_000
}
fn default_idle_ms() -> u64 {
    500
}
fn default_login_trigger() -> String {
    "div.log_signup a.linkSignIn".to_string()
}
fn default_modal_selector() -> String {
    "#LoginModal".to_string()
}
fn default_frame_selector() -> String {
    "iframe#myframe".to_string()
}
fn default_form_selector() -> String {
    "form.login_form".to_string()
}
fn default_email_field() -> String {
    "email".to_string()
}
fn default_password_field() -> String {
    "pwd".to_string()
}
fn default_submit_selector() -> String {
    "button.login_verify_btn".to_string()
}
fn default_disabled_class() -> String {
    "disable".to_string()
}
fn default_modal_timeout_ms() -> u64 {
    30_000
}
fn default_verify_timeout_ms() -> u64 {
    20_000
}
fn default_settle_ms() -> u64 {
    250
}
fn default_sink_kind() -> SinkKind {
    SinkKind::Csv
}
fn default_csv_path() -> PathBuf {
    PathBuf::from("data/swot.csv")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/swot.duckdb")
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            accept: default_accept(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            launch_timeout_secs: default_launch_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            home_url: default_home_url(),
            quote_base_url: default_quote_base_url(),
            nav_timeout_ms: default_nav_timeout_ms(),
            idle_ms: default_idle_ms(),
            request_delay_ms: 0,
            jitter_ms: 0,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            login_trigger: default_login_trigger(),
            modal_selector: default_modal_selector(),
            frame_selector: default_frame_selector(),
            form_selector: default_form_selector(),
            email_field: default_email_field(),
            password_field: default_password_field(),
            submit_selector: default_submit_selector(),
            disabled_class: default_disabled_class(),
            logged_in_selector: None,
            require_login_trigger: false,
            modal_timeout_ms: default_modal_timeout_ms(),
            verify_timeout_ms: default_verify_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            csv_path: default_csv_path(),
            db_path: default_db_path(),
        }
    }
}

impl PortalConfig {
    pub fn nav_timeout(&self) -> Duration {
        Duration::from_millis(self.nav_timeout_ms)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("SWOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_cfg: AppConfig = cfg.try_deserialize()?;

        // Older deployments export the bare MC_* pair.
        if app_cfg.auth.username.is_none() {
            app_cfg.auth.username = std::env::var("MC_USERNAME").ok();
        }
        if app_cfg.auth.password.is_none() {
            app_cfg.auth.password = std::env::var("MC_PASSWORD").ok();
        }

        Ok(app_cfg)
    }

    /// Resolve login credentials. Absent or blank values are a configuration
    /// error; there is no built-in fallback account.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = non_blank(self.auth.username.as_deref())
            .ok_or(ConfigError::MissingCredential("username", "USERNAME"))?;
        let password = non_blank(self.auth.password.as_deref())
            .ok_or(ConfigError::MissingCredential("password", "PASSWORD"))?;
        Ok(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Fail before scraping if the configured sink has nowhere to write.
    pub fn validate_sink(&self) -> Result<(), ConfigError> {
        let path = match self.sink.kind {
            SinkKind::Csv => &self.sink.csv_path,
            SinkKind::Duckdb => &self.sink.db_path,
        };
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDestination(self.sink.kind));
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
