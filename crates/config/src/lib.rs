//! Configuration loading, validation, and management for Tollgate.
//!
//! Loads configuration from `~/.tollgate/config.toml` with environment
//! variable overrides. Validates all settings once, before anything is built
//! from them.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tollgate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Daily spending ceiling in USD (0 = unlimited)
    #[serde(default)]
    pub daily_budget: f64,

    /// Serve repeated prompts from the response cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Also match near-duplicate prompts (cosine similarity over term counts)
    #[serde(default)]
    pub semantic_caching: bool,

    /// Minimum similarity for a near-duplicate hit, in [0, 1]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// How aggressively prompts are rewritten before being sent
    #[serde(default)]
    pub compression_level: CompressionLevel,

    /// Cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Budget alert thresholds
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Local fallback servers. When absent, enabled iff no remote provider
    /// is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_fallback: Option<LocalFallbackConfig>,

    /// Remote providers, tried in declaration order
    #[serde(default, skip_serializing_if = "RemoteProviders::is_empty")]
    pub remote_providers: RemoteProviders,

    /// Alert webhook
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// HTTP status API
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_true() -> bool {
    true
}
fn default_similarity_threshold() -> f64 {
    0.9
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("daily_budget", &self.daily_budget)
            .field("cache_enabled", &self.cache_enabled)
            .field("semantic_caching", &self.semantic_caching)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("compression_level", &self.compression_level)
            .field("cache", &self.cache)
            .field("alerts", &self.alerts)
            .field("local_fallback", &self.local_fallback)
            .field("remote_providers", &self.remote_providers)
            .field("webhooks", &self.webhooks)
            .field("server", &self.server)
            .finish()
    }
}

// ── Compression ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Whitespace normalisation only
    Low,
    /// + filler words and verbose phrases
    #[default]
    Medium,
    /// + articles, contractions and abbreviations
    High,
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for CompressionLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ConfigError::ValidationError(format!(
                "compression_level must be one of: low, medium, high (got '{other}')"
            ))),
        }
    }
}

// ── Cache / alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_max_size() -> usize {
    100
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Percent-of-limit thresholds, ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_warning")]
    pub warning: f64,

    #[serde(default = "default_urgent")]
    pub urgent: f64,

    #[serde(default = "default_critical")]
    pub critical: f64,
}

fn default_warning() -> f64 {
    50.0
}
fn default_urgent() -> f64 {
    80.0
}
fn default_critical() -> f64 {
    100.0
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            warning: default_warning(),
            urgent: default_urgent(),
            critical: default_critical(),
        }
    }
}

// ── Providers ─────────────────────────────────────────────────────────────

/// Local inference servers that speak the OpenAI-compatible protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalProviderKind {
    Ollama,
    Lmstudio,
}

impl LocalProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Lmstudio => "lmstudio",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tried in this order
    #[serde(default = "default_local_providers")]
    pub providers: Vec<LocalProviderKind>,
}

fn default_local_providers() -> Vec<LocalProviderKind> {
    vec![LocalProviderKind::Ollama, LocalProviderKind::Lmstudio]
}

impl Default for LocalFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            providers: default_local_providers(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    #[serde(default)]
    pub api_key: String,

    /// Override the provider's well-known endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// First entry is the default model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl std::fmt::Debug for RemoteProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_empty() { "None" } else { "[REDACTED]" };
        f.debug_struct("RemoteProviderConfig")
            .field("api_key", &key)
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish()
    }
}

/// Named remote providers in the order their keys were declared.
///
/// A plain `HashMap` would lose declaration order, which is the failover
/// order.
#[derive(Debug, Clone, Default)]
pub struct RemoteProviders(Vec<(String, RemoteProviderConfig)>);

impl RemoteProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, config: RemoteProviderConfig) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = config,
            None => self.0.push((name, config)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RemoteProviderConfig> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RemoteProviderConfig> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RemoteProviderConfig)> {
        self.0.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RemoteProviders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(n, c)| (n, c)))
    }
}

impl<'de> Deserialize<'de> for RemoteProviders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RemoteProviders;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a table of remote provider configurations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut providers = RemoteProviders::new();
                while let Some((name, config)) =
                    map.next_entry::<String, RemoteProviderConfig>()?
                {
                    providers.insert(name, config);
                }
                Ok(providers)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

// ── Webhooks / server ─────────────────────────────────────────────────────

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// JSON endpoint that receives every budget alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HMAC-SHA256 signing secret for the `X-Tollgate-Signature` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("secret", &redact(&self.secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// Load configuration from the default path (~/.tollgate/config.toml)
    /// and apply environment overrides:
    /// - `TOLLGATE_DAILY_BUDGET`
    /// - `TOLLGATE_COMPRESSION`
    /// - `OPENAI_API_KEY` (fills an `openai` provider declared without a key)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from a specific file path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse and validate an in-memory TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("TOLLGATE_DAILY_BUDGET") {
            self.daily_budget = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TOLLGATE_DAILY_BUDGET must be a number (got '{raw}')"
                ))
            })?;
        }

        if let Some(raw) = lookup("TOLLGATE_COMPRESSION") {
            self.compression_level = raw.parse()?;
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            if let Some(openai) = self.remote_providers.get_mut("openai") {
                if openai.api_key.is_empty() {
                    openai.api_key = key;
                }
            }
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tollgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.daily_budget.is_finite() || self.daily_budget < 0.0 {
            return Err(ConfigError::ValidationError(
                "daily_budget must be >= 0 (0 = unlimited)".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "similarity_threshold must be between 0 and 1".into(),
            ));
        }

        if self.cache.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_size must be at least 1".into(),
            ));
        }

        let AlertConfig {
            warning,
            urgent,
            critical,
        } = self.alerts;
        if !(warning > 0.0 && warning < urgent && urgent < critical) {
            return Err(ConfigError::ValidationError(
                "alert thresholds must satisfy 0 < warning < urgent < critical".into(),
            ));
        }

        if self.remote_providers.is_empty() && !self.local_fallback_enabled() {
            return Err(ConfigError::ValidationError(
                "At least one remote provider or local fallback must be enabled".into(),
            ));
        }

        Ok(())
    }

    /// Effective local fallback setting.
    pub fn local_fallback_enabled(&self) -> bool {
        match &self.local_fallback {
            Some(local) => local.enabled,
            None => self.remote_providers.is_empty(),
        }
    }

    /// Local providers in the order they should be tried.
    pub fn local_providers(&self) -> Vec<LocalProviderKind> {
        if !self.local_fallback_enabled() {
            return Vec::new();
        }
        self.local_fallback
            .as_ref()
            .map(|local| local.providers.clone())
            .unwrap_or_else(default_local_providers)
    }

    /// Copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for (_, provider) in copy.remote_providers.0.iter_mut() {
            if !provider.api_key.is_empty() {
                provider.api_key = "[REDACTED]".into();
            }
        }
        if copy.webhooks.secret.is_some() {
            copy.webhooks.secret = Some("[REDACTED]".into());
        }
        copy
    }

    /// Serialize to TOML (for the `config` command).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            daily_budget: 0.0,
            cache_enabled: true,
            semantic_caching: false,
            similarity_threshold: default_similarity_threshold(),
            compression_level: CompressionLevel::default(),
            cache: CacheConfig::default(),
            alerts: AlertConfig::default(),
            local_fallback: None,
            remote_providers: RemoteProviders::new(),
            webhooks: WebhookConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for tollgate_core::Error {
    fn from(err: ConfigError) -> Self {
        tollgate_core::Error::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn remote(key: &str) -> RemoteProviderConfig {
        RemoteProviderConfig {
            api_key: key.into(),
            ..RemoteProviderConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.daily_budget - 0.0).abs() < 1e-10);
        assert!(config.cache_enabled);
        assert!(!config.semantic_caching);
        assert_eq!(config.compression_level, CompressionLevel::Medium);
        // no remote providers → local fallback on by default
        assert!(config.local_fallback_enabled());
        assert_eq!(
            config.local_providers(),
            vec![LocalProviderKind::Ollama, LocalProviderKind::Lmstudio]
        );
    }

    #[test]
    fn negative_budget_rejected() {
        let config = GatewayConfig {
            daily_budget: -1.0,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn similarity_threshold_out_of_range_rejected() {
        for bad in [-0.1, 1.5] {
            let config = GatewayConfig {
                similarity_threshold: bad,
                ..GatewayConfig::default()
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn unknown_compression_level_rejected() {
        let err = GatewayConfig::from_toml_str(r#"compression_level = "extreme""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));

        let err = "extreme".parse::<CompressionLevel>().unwrap_err();
        assert!(err.to_string().contains("low, medium, high"));
    }

    #[test]
    fn no_backends_at_all_rejected() {
        let err = GatewayConfig::from_toml_str(
            r#"
[local_fallback]
enabled = false
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("At least one remote provider"));
    }

    #[test]
    fn remote_providers_keep_declaration_order() {
        let config = GatewayConfig::from_toml_str(
            r#"
daily_budget = 5.0

[remote_providers.mistral]
api_key = "m-key"

[remote_providers.openai]
api_key = "o-key"
models = ["gpt-4o-mini"]

[remote_providers.deepseek]
api_key = "d-key"
base_url = "https://proxy.example.com/v1"
"#,
        )
        .unwrap();

        assert_eq!(config.remote_providers.names(), vec!["mistral", "openai", "deepseek"]);
        assert_eq!(
            config.remote_providers.get("openai").unwrap().models,
            vec!["gpt-4o-mini".to_string()]
        );
        // remote declared and no [local_fallback] → local off
        assert!(!config.local_fallback_enabled());
        assert!(config.local_providers().is_empty());
    }

    #[test]
    fn explicit_local_order_respected() {
        let config = GatewayConfig::from_toml_str(
            r#"
[local_fallback]
enabled = true
providers = ["lmstudio", "ollama"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.local_providers(),
            vec![LocalProviderKind::Lmstudio, LocalProviderKind::Ollama]
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GatewayConfig::default();
        config.remote_providers.insert("openai", remote(""));

        let env: HashMap<&str, &str> = HashMap::from([
            ("TOLLGATE_DAILY_BUDGET", "12.5"),
            ("TOLLGATE_COMPRESSION", "HIGH"),
            ("OPENAI_API_KEY", "sk-env"),
        ]);
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert!((config.daily_budget - 12.5).abs() < 1e-10);
        assert_eq!(config.compression_level, CompressionLevel::High);
        assert_eq!(config.remote_providers.get("openai").unwrap().api_key, "sk-env");
    }

    #[test]
    fn env_override_does_not_replace_explicit_key() {
        let mut config = GatewayConfig::default();
        config.remote_providers.insert("openai", remote("sk-file"));
        config
            .apply_overrides(|k| (k == "OPENAI_API_KEY").then(|| "sk-env".to_string()))
            .unwrap();
        assert_eq!(config.remote_providers.get("openai").unwrap().api_key, "sk-file");
    }

    #[test]
    fn bad_budget_override_rejected() {
        let mut config = GatewayConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "TOLLGATE_DAILY_BUDGET").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_and_redacted_hide_secrets() {
        let mut config = GatewayConfig::default();
        config.remote_providers.insert("openai", remote("sk-secret"));
        config.webhooks.secret = Some("hook-secret".into());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("hook-secret"));

        let toml_str = config.redacted().to_toml_string().unwrap();
        assert!(!toml_str.contains("sk-secret"));
        assert!(toml_str.contains("[REDACTED]"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = GatewayConfig::default();
        config.remote_providers.insert("openai", remote("k1"));
        config.remote_providers.insert("anthropic", remote("k2"));
        let toml_str = config.to_toml_string().unwrap();
        let parsed = GatewayConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.remote_providers.names(), vec!["openai", "anthropic"]);
        assert_eq!(parsed.server.port, 3001);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = GatewayConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn config_error_converts_to_gateway_error() {
        let err: tollgate_core::Error = ConfigError::ValidationError("bad".into()).into();
        assert_eq!(err.kind(), tollgate_core::ErrorKind::Configuration);
    }
}
