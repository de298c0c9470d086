use serde::Deserialize;
use std::{env, fmt, fs, path::PathBuf, time::Duration};
use url::Url;

use crate::interface_adapters::host::BrowserCommand;

// Defaults follow the provider the login flow was first written against.
pub const DEFAULT_AUTHORIZE_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const DEFAULT_USERINFO_URL: &str = "https://graph.microsoft.com/oidc/userinfo";
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email", "User.Read"];
pub const DEFAULT_CALLBACK_PORT: u16 = 3900;
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const PROVIDER_TIMEOUT: Duration = Duration::from_millis(10_000);

#[cfg(target_os = "macos")]
const DEFAULT_BROWSER: &str = "open";
#[cfg(not(target_os = "macos"))]
const DEFAULT_BROWSER: &str = "xdg-open";

pub const CALLBACK_PATH: &str = "/auth/callback";

// Optional TOML file; every field can be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub client_id: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub callback_port: Option<u16>,
    pub session_file: Option<PathBuf>,
    pub browser: Option<String>,
    pub browser_detached: Option<bool>,
    pub api_url: Option<String>,
    pub api_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Only sign-in needs it; see `require_client_id`.
    pub client_id: Option<String>,
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub scopes: Vec<String>,
    pub callback_port: u16,
    pub session_file: PathBuf,
    pub browser: BrowserCommand,
    pub api_url: String,
    pub api_timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    MissingClientId,
    InvalidUrl(&'static str, String),
    InvalidNumber(&'static str, String),
    InvalidFlag(&'static str, String),
    EmptyBrowser,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path, err) => write!(f, "failed to read {}: {err}", path.display()),
            ConfigError::Parse(path, err) => write!(f, "failed to parse {}: {err}", path.display()),
            ConfigError::MissingClientId => {
                write!(f, "sign-in needs AUTH_CLIENT_ID (or client_id in the config file)")
            }
            ConfigError::InvalidUrl(key, value) => write!(f, "{key} must be a URL, got {value:?}"),
            ConfigError::InvalidNumber(key, value) => write!(f, "{key} must be a number, got {value:?}"),
            ConfigError::InvalidFlag(key, value) => {
                write!(f, "{key} must be true or false, got {value:?}")
            }
            ConfigError::EmptyBrowser => write!(f, "AUTH_BROWSER must name a program"),
        }
    }
}

impl std::error::Error for ConfigError {}

// Load the TOML file named by AUTH_CONFIG_FILE (if any) and apply environment overrides.
pub fn load() -> Result<AppConfig, ConfigError> {
    let file = match env::var("AUTH_CONFIG_FILE") {
        Ok(path) => read_file(PathBuf::from(path))?,
        Err(_) => FileConfig::default(),
    };
    AppConfig::from_sources(file, |key| env::var(key).ok())
}

pub fn read_file(path: PathBuf) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|err| ConfigError::Read(path.clone(), err))?;
    toml::from_str(&contents).map_err(|err| ConfigError::Parse(path, err))
}

// Per-user location, so every working directory sees the same session.
pub fn default_session_file() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config").join("auth_client"))
        .unwrap_or_else(|| PathBuf::from(".auth_client"))
        .join("session.json")
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(key, value))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let client_id = env("AUTH_CLIENT_ID")
            .or(file.client_id)
            .filter(|value| !value.trim().is_empty());

        let authorize_url = parse_url(
            "AUTH_AUTHORIZE_URL",
            env("AUTH_AUTHORIZE_URL")
                .or(file.authorize_url)
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
        )?;
        let token_url = parse_url(
            "AUTH_TOKEN_URL",
            env("AUTH_TOKEN_URL")
                .or(file.token_url)
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        )?;
        let userinfo_url = parse_url(
            "AUTH_USERINFO_URL",
            env("AUTH_USERINFO_URL")
                .or(file.userinfo_url)
                .unwrap_or_else(|| DEFAULT_USERINFO_URL.to_string()),
        )?;

        // Scopes from the environment may be comma- or space-separated.
        let scopes = match env("AUTH_SCOPES") {
            Some(value) => value
                .split([',', ' '])
                .filter(|scope| !scope.is_empty())
                .map(str::to_string)
                .collect(),
            None => file
                .scopes
                .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()),
        };

        let callback_port = match env("AUTH_CALLBACK_PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("AUTH_CALLBACK_PORT", value))?,
            None => file.callback_port.unwrap_or(DEFAULT_CALLBACK_PORT),
        };

        let session_file = env("AUTH_SESSION_FILE")
            .map(PathBuf::from)
            .or(file.session_file)
            .unwrap_or_else(default_session_file);

        // The default launcher hands off to a running browser and exits.
        let configured_browser = env("AUTH_BROWSER").or(file.browser);
        let detached_by_default = configured_browser.is_none();
        let mut browser = BrowserCommand::parse(
            configured_browser.as_deref().unwrap_or(DEFAULT_BROWSER),
        )
        .ok_or(ConfigError::EmptyBrowser)?;
        browser.detached = match env("AUTH_BROWSER_DETACHED") {
            Some(value) => parse_flag(&value)
                .ok_or(ConfigError::InvalidFlag("AUTH_BROWSER_DETACHED", value))?,
            None => file.browser_detached.unwrap_or(detached_by_default),
        };

        let api_url = env("PORTAL_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_timeout = match env("PORTAL_API_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber("PORTAL_API_TIMEOUT_MS", value))?,
            ),
            None => file
                .api_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_API_TIMEOUT),
        };

        Ok(Self {
            client_id,
            authorize_url,
            token_url,
            userinfo_url,
            scopes,
            callback_port,
            session_file,
            browser,
            api_url,
            api_timeout,
        })
    }

    pub fn require_client_id(&self) -> Result<&str, ConfigError> {
        self.client_id.as_deref().ok_or(ConfigError::MissingClientId)
    }
}
