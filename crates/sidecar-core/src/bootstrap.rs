//! Bootstrap parameters carried on the hosting script's URL
//!
//! The agent is loaded as
//! `<script src="https://cdn.example/sidecar.js?apikey=client-xyz&multiexpids=a,b">`.
//! Everything it needs before the remote config arrives is read from that query.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Parameters parsed from the hosting script URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapParams {
    /// Client api key (`apikey`)
    pub api_key: String,
    /// Explicit experiment ids (`multiexpids`), bypassing the matcher
    pub experiment_ids: Option<Vec<String>>,
    /// Apply experiments during setup (`autostart`)
    pub auto_start: bool,
    /// Let the provider capture page events (`autocapture`)
    pub auto_capture: bool,
    /// Hide the body until setup finishes (`reduceflicker`)
    pub reduce_flicker: bool,
    /// Override for the initialize endpoint (`initializeapi`)
    pub initialize_api: Option<String>,
    /// Override for the event endpoint (`logeventapi`)
    pub log_event_api: Option<String>,
    /// Identity to evaluate instead of the stable id (`overrideuser`)
    pub override_user: Option<String>,
}

impl BootstrapParams {
    /// Params with only an api key and every flag at its default
    #[inline]
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            experiment_ids: None,
            auto_start: true,
            auto_capture: true,
            reduce_flicker: true,
            initialize_api: None,
            log_event_api: None,
            override_user: None,
        }
    }

    /// Parse the hosting script's `src`
    ///
    /// # Errors
    /// - `ConfigError::InvalidScriptUrl` if `src` is not an absolute URL
    /// - `ConfigError::MissingApiKey` if `apikey` is absent or empty
    /// - `ConfigError::InvalidValue` if a boolean flag is not recognised
    pub fn from_script_url(src: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(src).map_err(|e| ConfigError::InvalidScriptUrl {
            url: src.to_string(),
            reason: e.to_string(),
        })?;

        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        let api_key = param("apikey")
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut params = Self::new(api_key);
        params.experiment_ids = param("multiexpids").and_then(|raw| parse_id_list(&raw));
        if let Some(raw) = param("autostart") {
            params.auto_start = parse_flag("autostart", &raw)?;
        }
        if let Some(raw) = param("autocapture") {
            params.auto_capture = parse_flag("autocapture", &raw)?;
        }
        if let Some(raw) = param("reduceflicker") {
            params.reduce_flicker = parse_flag("reduceflicker", &raw)?;
        }
        params.initialize_api = param("initializeapi").filter(|v| !v.is_empty());
        params.log_event_api = param("logeventapi").filter(|v| !v.is_empty());
        params.override_user = param("overrideuser").filter(|v| !v.is_empty());

        tracing::debug!(
            experiment_ids = ?params.experiment_ids,
            auto_start = params.auto_start,
            reduce_flicker = params.reduce_flicker,
            "parsed bootstrap parameters"
        );
        Ok(params)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(key, raw)),
    }
}

/// Comma separated ids, empty entries dropped; `None` when nothing remains
fn parse_id_list(raw: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://cdn.example.com/sidecar.js";

    #[test]
    fn defaults_with_only_api_key() {
        let params = BootstrapParams::from_script_url(&format!("{BASE}?apikey=client-1")).unwrap();
        assert_eq!(params, BootstrapParams::new("client-1"));
        assert!(params.auto_start);
        assert!(params.reduce_flicker);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        assert_eq!(
            BootstrapParams::from_script_url(BASE),
            Err(ConfigError::MissingApiKey)
        );
        assert_eq!(
            BootstrapParams::from_script_url(&format!("{BASE}?apikey=")),
            Err(ConfigError::MissingApiKey)
        );
    }

    #[test]
    fn relative_script_url_is_rejected() {
        let err = BootstrapParams::from_script_url("/sidecar.js?apikey=k").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScriptUrl { .. }));
    }

    #[test]
    fn parses_flags_and_id_list() {
        let src = format!(
            "{BASE}?apikey=k&multiexpids=exp_a,,exp_b,&autostart=0&autocapture=off\
             &reduceflicker=yes&overrideuser=alice&logeventapi=https%3A%2F%2Fevents.example"
        );
        let params = BootstrapParams::from_script_url(&src).unwrap();
        assert_eq!(
            params.experiment_ids,
            Some(vec!["exp_a".to_string(), "exp_b".to_string()])
        );
        assert!(!params.auto_start);
        assert!(!params.auto_capture);
        assert!(params.reduce_flicker);
        assert_eq!(params.override_user.as_deref(), Some("alice"));
        assert_eq!(params.log_event_api.as_deref(), Some("https://events.example"));
        assert_eq!(params.initialize_api, None);
    }

    #[test]
    fn empty_id_list_means_no_override() {
        let params =
            BootstrapParams::from_script_url(&format!("{BASE}?apikey=k&multiexpids=,,")).unwrap();
        assert_eq!(params.experiment_ids, None);
    }

    #[test]
    fn unknown_flag_value_is_rejected() {
        let err =
            BootstrapParams::from_script_url(&format!("{BASE}?apikey=k&autostart=maybe")).unwrap_err();
        assert_eq!(err, ConfigError::invalid_value("autostart", "maybe"));
    }

    #[test]
    fn flags_are_case_insensitive() {
        assert_eq!(parse_flag("f", "TRUE"), Ok(true));
        assert_eq!(parse_flag("f", "Off"), Ok(false));
    }
}
