use anyhow::{bail, Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Top-level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Token lifetime, binding and transport settings.
    pub authenticator: AuthenticatorConfig,
    /// Where stateful authenticators live.
    pub store: StoreConfig,
}

impl Config {
    /// `~/.authgate/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".authgate").join("config.toml"))
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Self::default_path()?;
        if default.exists() {
            Self::load(&default)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.authenticator.validate()?;
        self.store.validate()
    }

    /// JSON schema of the config file.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

// ── Authenticator ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AuthenticatorConfig {
    /// Header (or cookie) name carrying the token.
    pub token_name: String,
    /// Cookie path, for transports that set cookies.
    pub path: String,
    /// Cookie domain, for transports that set cookies.
    pub domain: Option<String>,
    /// Cookie max-age in seconds. `None` means a session cookie.
    pub max_age_secs: Option<u64>,
    pub secure: bool,
    pub http_only: bool,
    /// Seal stateless tokens with AES-256-GCM. Plain tokens are only
    /// base64url-encoded JSON and can be forged.
    pub encrypt_authenticator: bool,
    /// Bind tokens to the creating request's fingerprint.
    pub use_fingerprinting: bool,
    /// Include the client address in the fingerprint.
    pub fingerprint_remote_address: bool,
    /// Sliding idle window in seconds. Unset disables it.
    pub idle_timeout_secs: Option<u64>,
    /// Absolute lifetime in seconds.
    pub expiry_secs: u64,
    /// File holding the raw 32-byte secret key. `~` is expanded.
    pub secret_key_path: Option<String>,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            token_name: "X-Auth-Token".into(),
            path: "/".into(),
            domain: None,
            max_age_secs: None,
            secure: true,
            http_only: true,
            encrypt_authenticator: true,
            use_fingerprinting: true,
            fingerprint_remote_address: false,
            idle_timeout_secs: None,
            expiry_secs: 12 * 3600,
            secret_key_path: None,
        }
    }
}

impl AuthenticatorConfig {
    fn validate(&self) -> Result<()> {
        if self.token_name.trim().is_empty() {
            bail!("authenticator.token_name must not be empty");
        }
        if self.expiry_secs == 0 {
            bail!("authenticator.expiry_secs must be greater than zero");
        }
        if self.idle_timeout_secs == Some(0) {
            bail!("authenticator.idle_timeout_secs must be greater than zero when set");
        }
        if let Some(idle) = self.idle_timeout_secs {
            if i64::try_from(idle).is_err() {
                bail!("authenticator.idle_timeout_secs must not exceed {}", i64::MAX);
            }
            if idle > self.expiry_secs {
                tracing::warn!(
                    idle_timeout_secs = idle,
                    expiry_secs = self.expiry_secs,
                    "Idle timeout exceeds expiry; it will never fire"
                );
            }
        }
        Ok(())
    }

    /// Expanded secret key path, if configured.
    pub fn resolved_secret_key_path(&self) -> Option<PathBuf> {
        self.secret_key_path.as_deref().map(expand_path)
    }
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreConfig {
    /// `"stateless"`, `"memory"` or `"sqlite"`.
    pub backend: String,
    /// SQLite database file. Required for the sqlite backend.
    pub db_path: Option<String>,
    /// Seconds between expired-record sweeps. 0 disables sweeping.
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "stateless".into(),
            db_path: None,
            purge_interval_secs: 300,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "stateless" | "memory" => Ok(()),
            "sqlite" if self.db_path.is_some() => Ok(()),
            "sqlite" => bail!("store.db_path is required for the sqlite backend"),
            other => bail!("Unknown store backend: {other}"),
        }
    }

    pub fn is_stateful(&self) -> bool {
        self.backend != "stateless"
    }

    /// Expanded database path, if configured.
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.as_deref().map(expand_path)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_stateless_and_sealed() {
        let config = Config::default();
        assert_eq!(config.authenticator.token_name, "X-Auth-Token");
        assert_eq!(config.authenticator.expiry_secs, 43_200);
        assert!(config.authenticator.encrypt_authenticator);
        assert!(config.authenticator.use_fingerprinting);
        assert!(config.authenticator.idle_timeout_secs.is_none());
        assert!(!config.store.is_stateful());
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = Config::from_toml(
            r#"
[authenticator]
idle_timeout_secs = 1800
use_fingerprinting = false

[store]
backend = "sqlite"
db_path = "/var/lib/authgate/tokens.db"
"#,
        )
        .unwrap();
        assert_eq!(config.authenticator.idle_timeout_secs, Some(1800));
        assert!(!config.authenticator.use_fingerprinting);
        assert_eq!(config.authenticator.expiry_secs, 43_200);
        assert!(config.store.is_stateful());
        assert_eq!(
            config.store.resolved_db_path(),
            Some(PathBuf::from("/var/lib/authgate/tokens.db"))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_toml("[authenticator]\nexpiry_secs = 0").is_err());
        assert!(Config::from_toml("[authenticator]\nidle_timeout_secs = 0").is_err());
        assert!(Config::from_toml("[authenticator]\ntoken_name = \"  \"").is_err());
        assert!(Config::from_toml("[store]\nbackend = \"redis\"").is_err());
        assert!(Config::from_toml("[store]\nbackend = \"sqlite\"").is_err());
        assert!(Config::from_toml("[authenticator]\nexpiry_secs = \"soon\"").is_err());
    }

    #[test]
    fn unstorable_idle_timeout_is_rejected() {
        let config = Config {
            authenticator: AuthenticatorConfig {
                idle_timeout_secs: Some(u64::MAX),
                expiry_secs: u64::MAX,
                ..AuthenticatorConfig::default()
            },
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("idle_timeout_secs must not exceed"));

        let largest = Config {
            authenticator: AuthenticatorConfig {
                idle_timeout_secs: Some(i64::MAX as u64),
                expiry_secs: u64::MAX,
                ..AuthenticatorConfig::default()
            },
            ..Config::default()
        };
        largest.validate().unwrap();
    }

    #[test]
    fn tilde_is_expanded() {
        let config = AuthenticatorConfig {
            secret_key_path: Some("~/.authgate/secret.key".into()),
            ..AuthenticatorConfig::default()
        };
        let resolved = config.resolved_secret_key_path().unwrap();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with(".authgate/secret.key"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config = Config {
            store: StoreConfig {
                backend: "memory".into(),
                ..StoreConfig::default()
            },
            ..Config::default()
        };
        file.write_all(toml::to_string_pretty(&config).unwrap().as_bytes())
            .unwrap();

        assert_eq!(Config::load(file.path()).unwrap(), config);
        assert_eq!(Config::load_or_default(Some(file.path())).unwrap(), config);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn schema_names_sections() {
        let schema = Config::json_schema().unwrap();
        assert!(schema.contains("authenticator"));
        assert!(schema.contains("purge_interval_secs"));
    }
}
