//! Server configuration for Staticms.
//!
//! Settings are read from `.staticms/staticms.toml`, then overridden by
//! environment variables (a `.env` file is honoured), then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! public_url = "http://localhost:3141"
//! dev_mode = false
//!
//! [github]
//! api_url = "https://api.github.com"
//! oauth_url = "https://github.com"
//! client_id = "Iv1.0123456789abcdef"
//! user_agent = "staticms"
//!
//! [session]
//! cookie_name = "staticms_session"
//! ttl_hours = 168
//! secure_cookie = false
//!
//! [content]
//! config_path = "staticms.config.yml"
//! branch_prefix = "staticms/"
//! ```
//!
//! Secrets (`client_secret`, `webhook_secret`) may live in the file but are
//! normally supplied as `GITHUB_CLIENT_SECRET` / `GITHUB_WEBHOOK_SECRET`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the server config, relative to the project dir.
pub const STATICMS_DIR: &str = ".staticms";
/// Config file name inside [`STATICMS_DIR`].
pub const CONFIG_FILE: &str = "staticms.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used to build the OAuth redirect URI.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Permissive CORS and bind on all interfaces (for a local Vite dev server)
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_oauth_url() -> String {
    "https://github.com".to_string()
}

fn default_user_agent() -> String {
    "staticms".to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            oauth_url: default_oauth_url(),
            client_id: None,
            client_secret: None,
            webhook_secret: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Mark the session cookie `Secure` (serve behind HTTPS)
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "staticms_session".to_string()
}

fn default_ttl_hours() -> u64 {
    24 * 7
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_hours: default_ttl_hours(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSection {
    /// Location of the content config inside each repository
    #[serde(default = "default_config_path")]
    pub config_path: String,
    /// Prefix for branches created by submissions
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_config_path() -> String {
    "staticms.config.yml".to_string()
}

fn default_branch_prefix() -> String {
    "staticms/".to_string()
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

/// Contents of `staticms.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticmsToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub content: ContentSection,
}

impl StaticmsToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse staticms.toml")
    }

    /// Load configuration from `<dir>/staticms.toml`, or defaults if absent.
    pub fn load_or_default(staticms_dir: &Path) -> Result<Self> {
        let config_path = staticms_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize staticms.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var(..).ok()` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("STATICMS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("STATICMS_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("STATICMS_PUBLIC_URL") {
            self.server.public_url = Some(url);
        }
        if let Some(id) = lookup("GITHUB_CLIENT_ID") {
            self.github.client_id = Some(id);
        }
        if let Some(secret) = lookup("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(secret);
        }
        if let Some(secret) = lookup("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = Some(secret);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match (&self.github.client_id, &self.github.client_secret) {
            (Some(_), None) => warnings.push(
                "github.client_id is set without a client secret; OAuth login is disabled"
                    .to_string(),
            ),
            (None, Some(_)) => warnings.push(
                "github client secret is set without github.client_id; OAuth login is disabled"
                    .to_string(),
            ),
            _ => {}
        }

        for (key, url) in [
            ("github.api_url", &self.github.api_url),
            ("github.oauth_url", &self.github.oauth_url),
        ] {
            if !is_http_url(url) {
                warnings.push(format!("{} '{}' is not an http(s) URL", key, url));
            }
        }
        if let Some(ref url) = self.server.public_url
            && !is_http_url(url)
        {
            warnings.push(format!("server.public_url '{}' is not an http(s) URL", url));
        }

        if self.session.ttl_hours == 0 {
            warnings.push("session.ttl_hours is 0; sessions expire immediately".to_string());
        }
        if self.session.cookie_name.trim().is_empty() {
            warnings.push("session.cookie_name is empty".to_string());
        }

        if self.content.branch_prefix.is_empty() {
            warnings.push(
                "content.branch_prefix is empty; every open pull request is treated as a Staticms one"
                    .to_string(),
            );
        } else if !self.content.branch_prefix.ends_with('/') {
            warnings.push(format!(
                "content.branch_prefix '{}' should end with '/'",
                self.content.branch_prefix
            ));
        }
        if self.content.config_path.trim().is_empty() {
            warnings.push("content.config_path is empty".to_string());
        }

        warnings
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolved runtime configuration: file, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct StaticmsConfig {
    pub project_dir: PathBuf,
    pub staticms_dir: PathBuf,
    pub toml: StaticmsToml,
}

impl StaticmsConfig {
    /// Load configuration for a project directory, applying environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        // A missing .env is fine
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let staticms_dir = project_dir.join(STATICMS_DIR);
        let mut toml = StaticmsToml::load_or_default(&staticms_dir)?;
        toml.apply_env(|key| std::env::var(key).ok());

        Ok(Self {
            project_dir,
            staticms_dir,
            toml,
        })
    }

    /// Apply CLI overrides on top of file and environment values.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>, dev: bool) -> Self {
        if let Some(host) = host {
            self.toml.server.host = host;
        }
        if let Some(port) = port {
            self.toml.server.port = port;
        }
        if dev {
            self.toml.server.dev_mode = true;
        }
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.staticms_dir.join(CONFIG_FILE)
    }

    pub fn bind_addr(&self) -> String {
        let host = if self.toml.server.dev_mode {
            "0.0.0.0"
        } else {
            self.toml.server.host.as_str()
        };
        format!("{}:{}", host, self.toml.server.port)
    }

    pub fn public_url(&self) -> String {
        self.toml
            .server
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.toml.server.port))
            .trim_end_matches('/')
            .to_string()
    }

    /// OAuth redirect URI registered with the GitHub OAuth app.
    pub fn redirect_uri(&self) -> String {
        format!("{}/api/auth/callback", self.public_url())
    }

    pub fn oauth_configured(&self) -> bool {
        self.toml.github.client_id.is_some() && self.toml.github.client_secret.is_some()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = StaticmsToml::parse("").unwrap();
        assert_eq!(toml.server.port, 3141);
        assert_eq!(toml.server.host, "127.0.0.1");
        assert_eq!(toml.github.api_url, "https://api.github.com");
        assert_eq!(toml.session.cookie_name, "staticms_session");
        assert_eq!(toml.session.ttl_hours, 168);
        assert_eq!(toml.content.config_path, "staticms.config.yml");
        assert_eq!(toml.content.branch_prefix, "staticms/");
    }

    #[test]
    fn test_parse_sections() {
        let toml = StaticmsToml::parse(
            r#"
[server]
port = 8080
public_url = "https://cms.example.com"

[github]
client_id = "Iv1.abc"
client_secret = "shh"

[content]
branch_prefix = "cms/"
"#,
        )
        .unwrap();
        assert_eq!(toml.server.port, 8080);
        assert_eq!(toml.github.client_id.as_deref(), Some("Iv1.abc"));
        assert_eq!(toml.content.branch_prefix, "cms/");
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = StaticmsToml::parse("[server]\nport = 8080\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("STATICMS_PORT", "9090"),
            ("GITHUB_CLIENT_ID", "Iv1.env"),
            ("GITHUB_WEBHOOK_SECRET", "hook"),
        ]);
        toml.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(toml.server.port, 9090);
        assert_eq!(toml.github.client_id.as_deref(), Some("Iv1.env"));
        assert_eq!(toml.github.webhook_secret.as_deref(), Some("hook"));
    }

    #[test]
    fn test_env_ignores_unparseable_port() {
        let mut toml = StaticmsToml::default();
        toml.apply_env(|k| (k == "STATICMS_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(toml.server.port, 3141);
    }

    #[test]
    fn test_validate_half_configured_oauth() {
        let mut toml = StaticmsToml::default();
        toml.github.client_id = Some("Iv1.abc".into());
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("client secret"));
    }

    #[test]
    fn test_validate_bad_values() {
        let mut toml = StaticmsToml::default();
        toml.github.api_url = "api.github.com".into();
        toml.session.ttl_hours = 0;
        toml.content.branch_prefix = "cms".into();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_load_and_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = StaticmsToml::default();
        toml.server.port = 4000;
        toml.save(&path).unwrap();

        let loaded = StaticmsToml::load(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let toml = StaticmsToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.server.port, 3141);
    }

    #[test]
    fn test_cli_overrides_and_derived_urls() {
        let dir = TempDir::new().unwrap();
        let config = StaticmsConfig {
            project_dir: dir.path().to_path_buf(),
            staticms_dir: dir.path().join(STATICMS_DIR),
            toml: StaticmsToml::default(),
        }
        .with_overrides(Some("localhost".into()), Some(5000), false);

        assert_eq!(config.bind_addr(), "localhost:5000");
        assert_eq!(config.public_url(), "http://localhost:5000");
        assert_eq!(
            config.redirect_uri(),
            "http://localhost:5000/api/auth/callback"
        );
        assert!(!config.oauth_configured());

        let dev = config.with_overrides(None, None, true);
        assert_eq!(dev.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_public_url_trailing_slash_trimmed() {
        let mut toml = StaticmsToml::default();
        toml.server.public_url = Some("https://cms.example.com/".into());
        let config = StaticmsConfig {
            project_dir: PathBuf::from("."),
            staticms_dir: PathBuf::from(STATICMS_DIR),
            toml,
        };
        assert_eq!(
            config.redirect_uri(),
            "https://cms.example.com/api/auth/callback"
        );
    }
}
