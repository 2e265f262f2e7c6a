use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionTiming;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    File(PathBuf),
}

/// Hosted backend (REST) credentials. Present only when both the URL and the
/// service key are set.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub url: String,
    pub service_key: String,
    pub anon_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub store: StoreKind,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub metrics_enabled: bool,
    pub session: SessionTiming,
    pub backend: Option<BackendConfig>,
}

fn string_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
fn bool_env(name: &str, default: bool) -> bool {
    string_env(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
}
fn millis_env(name: &str, default: u64) -> Duration {
    Duration::from_millis(string_env(name).and_then(|v| v.parse().ok()).unwrap_or(default))
}

impl AppConfig {
    pub fn from_env() -> Self {
        let store = match string_env("MINDWHISPER_STORE").as_deref() {
            Some(s) if s.eq_ignore_ascii_case("memory") => StoreKind::Memory,
            _ => StoreKind::File(
                string_env("MINDWHISPER_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            ),
        };
        Self {
            bind_addr: string_env("MINDWHISPER_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: string_env("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            store,
            frontend_url: string_env("FRONTEND_URL"),
            enable_hsts: bool_env("ENABLE_HSTS", false),
            metrics_enabled: bool_env("METRICS_ENABLED", true),
            session: SessionTiming {
                processing: millis_env("SESSION_PROCESSING_MS", 2_000),
                speaking: millis_env("SESSION_SPEAKING_MS", 3_000),
            },
            backend: BackendConfig::from_env(),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Option<Self> {
        let url = string_env("SUPABASE_URL")?;
        let service_key = string_env("SUPABASE_SERVICE_ROLE_KEY")?;
        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            anon_key: string_env("SUPABASE_ANON_KEY"),
        })
    }
}
