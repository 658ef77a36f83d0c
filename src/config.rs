use std::{collections::HashSet, sync::Arc};

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{CONTENT_DISPOSITION, CONTENT_TYPE},
};
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};
use url::Url;

use crate::{download::DOWNLOAD_ID_HEADER, error::ServerError};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 180;
const DEV_ORIGINS: [&str; 2] = ["http://127.0.0.1:5173", "http://localhost:5173"];

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Empty when `ALLOWED_ORIGINS` is unset.
    pub allowed_origins: Vec<String>,
    pub yt_dlp_bin: String,
    pub yt_dlp_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind_addr = resolve_bind_addr(&lookup);
        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let yt_dlp_bin = lookup("YT_DLP_BIN")
            .and_then(|value| non_empty(&value).map(ToString::to_string))
            .unwrap_or_else(|| DEFAULT_YT_DLP_BIN.to_string());
        let yt_dlp_timeout = lookup("YT_DLP_TIMEOUT_SECONDS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
            .unwrap_or(DEFAULT_YT_DLP_TIMEOUT_SECONDS);

        Self {
            bind_addr,
            allowed_origins,
            yt_dlp_bin,
            yt_dlp_timeout: Duration::from_secs(yt_dlp_timeout),
        }
    }
}

fn resolve_bind_addr(lookup: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) =
        lookup("APP_ADDR").and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = lookup("PORT").and_then(|value| value.trim().parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

pub fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ServerError> {
    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to the local development origins.");
        DEV_ORIGINS.iter().map(ToString::to_string).collect()
    } else {
        configured.to_vec()
    };

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static(DOWNLOAD_ID_HEADER),
        ]))
}

/// Reduces an origin to `scheme://host[:port]`, omitting default ports.
fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, "127.0.0.1:8787");
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.yt_dlp_bin, "yt-dlp");
        assert_eq!(config.yt_dlp_timeout, Duration::from_secs(180));
    }

    #[test]
    fn app_addr_wins_over_port() {
        assert_eq!(config_from(&[("PORT", "9000")]).bind_addr, "0.0.0.0:9000");
        assert_eq!(
            config_from(&[("APP_ADDR", "127.0.0.1:3000"), ("PORT", "9000")]).bind_addr,
            "127.0.0.1:3000"
        );
        assert_eq!(config_from(&[("PORT", "nope")]).bind_addr, "127.0.0.1:8787");
    }

    #[test]
    fn reads_origins_binary_and_timeout() {
        let config = config_from(&[
            (
                "ALLOWED_ORIGINS",
                " https://vidgrab.app , ,http://localhost:5173",
            ),
            ("YT_DLP_BIN", "/opt/bin/yt-dlp"),
            ("YT_DLP_TIMEOUT_SECONDS", "30"),
        ]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://vidgrab.app", "http://localhost:5173"]
        );
        assert_eq!(config.yt_dlp_bin, "/opt/bin/yt-dlp");
        assert_eq!(config.yt_dlp_timeout, Duration::from_secs(30));

        let config = config_from(&[("YT_DLP_TIMEOUT_SECONDS", "0"), ("YT_DLP_BIN", "  ")]);
        assert_eq!(config.yt_dlp_timeout, Duration::from_secs(180));
        assert_eq!(config.yt_dlp_bin, "yt-dlp");
    }

    #[test]
    fn origins_are_normalized() {
        assert_eq!(
            normalize_origin("HTTPS://VidGrab.app:443").as_deref(),
            Some("https://vidgrab.app")
        );
        assert_eq!(
            normalize_origin("http://localhost:5173/").as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(normalize_origin("https://vidgrab.app/path"), None);
        assert_eq!(normalize_origin("ftp://vidgrab.app"), None);
        assert_eq!(normalize_origin("not an origin"), None);
    }

    #[test]
    fn invalid_origin_is_a_startup_error() {
        let origin = "https://vidgrab.app/app";
        let error = build_cors_layer(&[origin.to_string()]).unwrap_err();
        assert!(matches!(error, ServerError::InvalidOrigin(value) if value == origin));
        assert!(build_cors_layer(&[]).is_ok());
    }
}
