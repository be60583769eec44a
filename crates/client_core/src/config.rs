use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "storyteller.toml";

/// How a continuation is sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPolicy {
    /// Only the new user input; the backend keeps story memory per session.
    #[default]
    InputOnly,
    /// New input plus the whole accumulated story, for stateless backends.
    FullContext,
}

impl FromStr for ContinuationPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "input_only" => Ok(ContinuationPolicy::InputOnly),
            "full_context" => Ok(ContinuationPolicy::FullContext),
            other => anyhow::bail!("unknown continuation policy '{other}'"),
        }
    }
}

impl fmt::Display for ContinuationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinuationPolicy::InputOnly => f.write_str("input_only"),
            ContinuationPolicy::FullContext => f.write_str("full_context"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub continuation_policy: ContinuationPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".into(),
            request_timeout_secs: 30,
            continuation_policy: ContinuationPolicy::InputOnly,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed backend base URL, normalized to end in `/` so endpoint paths
    /// join beneath it instead of replacing its last segment.
    pub fn backend_base_url(&self) -> anyhow::Result<Url> {
        let mut raw = self.backend_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("invalid backend url '{}'", self.backend_url))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

/// Defaults, then the TOML file at `path` if it exists, then environment
/// overrides.
pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<Settings>(&raw) {
            Ok(file_cfg) => settings = file_cfg,
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("STORYTELLER_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = lookup("APP__CONTINUATION_POLICY") {
        match v.parse::<ContinuationPolicy>() {
            Ok(policy) => settings.continuation_policy = policy,
            Err(err) => warn!("ignoring APP__CONTINUATION_POLICY: {err}"),
        }
    }
}
