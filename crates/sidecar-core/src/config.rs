//! Agent configuration
//!
//! [`AgentConfig`] is derived from the [`BootstrapParams`] plus tunables that
//! the page cannot express on the script URL.

use crate::bootstrap::BootstrapParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Id of the style element hiding the body during setup
pub const REVEAL_STYLE_ID: &str = "__sbpd";

/// Markup of the reveal gate
pub const REVEAL_STYLE_BODY: &str = "body { display: none; }";

/// Storage key of the per-browser stable id
pub const STABLE_ID_KEY: &str = "STATSIG_LOCAL_STORAGE_STABLE_ID";

/// Dynamic config listing the active experiments
pub const SIDECAR_CONFIG_NAME: &str = "sidecar_dynamic_config";

/// Key of the experiment list inside [`SIDECAR_CONFIG_NAME`]
pub const ACTIVE_EXPERIMENTS_KEY: &str = "activeExperiments";

/// Key of the directive list inside an experiment's value
pub const DIRECTIVES_KEY: &str = "directives";

/// Prefix of the host event channel name
pub const HOST_CHANNEL_PREFIX: &str = "sidecar_";

/// Default upper bound on how long the page stays hidden
pub const DEFAULT_REVEAL_TIMEOUT_MS: u64 = 3000;

/// Options handed to the provider at initialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Initialize endpoint override
    pub initialize_api: Option<String>,
    /// Event endpoint override
    pub log_event_api: Option<String>,
    /// Let the provider capture page events on its own
    pub auto_capture: bool,
}

/// Sidecar agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Client api key
    pub api_key: String,
    /// Explicit experiment ids; `None` runs the matcher
    pub experiment_ids: Option<Vec<String>>,
    /// Apply experiments during setup
    pub auto_start: bool,
    /// Hide the body until setup finishes
    pub reduce_flicker: bool,
    /// Maximum time the body stays hidden, in milliseconds
    pub reveal_timeout_ms: u64,
    /// Attributes removed by `image-change`
    pub image_override_attributes: Vec<String>,
    /// CSP nonce of the hosting script
    pub nonce: Option<String>,
    /// Identity to evaluate instead of the stable id
    pub override_user: Option<String>,
    /// Provider options
    pub client: ClientOptions,
}

impl AgentConfig {
    /// Configuration for `api_key` with defaults
    #[inline]
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Derive configuration from bootstrap parameters
    #[must_use]
    pub fn from_bootstrap(params: BootstrapParams) -> Self {
        Self {
            api_key: params.api_key,
            experiment_ids: params.experiment_ids,
            auto_start: params.auto_start,
            reduce_flicker: params.reduce_flicker,
            override_user: params.override_user,
            client: ClientOptions {
                initialize_api: params.initialize_api,
                log_event_api: params.log_event_api,
                auto_capture: params.auto_capture,
            },
            ..Self::default()
        }
    }

    /// With explicit experiment ids
    #[inline]
    #[must_use]
    pub fn with_experiment_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.experiment_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// With auto start
    #[inline]
    #[must_use]
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// With reduce flicker
    #[inline]
    #[must_use]
    pub fn with_reduce_flicker(mut self, reduce_flicker: bool) -> Self {
        self.reduce_flicker = reduce_flicker;
        self
    }

    /// With reveal timeout
    #[inline]
    #[must_use]
    pub fn with_reveal_timeout(mut self, timeout: Duration) -> Self {
        self.reveal_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With CSP nonce
    #[inline]
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// With override user
    #[inline]
    #[must_use]
    pub fn with_override_user(mut self, user: impl Into<String>) -> Self {
        self.override_user = Some(user.into());
        self
    }

    /// With image override attributes
    #[inline]
    #[must_use]
    pub fn with_image_override_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_override_attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Reveal timeout as a duration
    #[inline]
    #[must_use]
    pub fn reveal_timeout(&self) -> Duration {
        Duration::from_millis(self.reveal_timeout_ms)
    }

    /// Name of the host event channel for this key
    #[inline]
    #[must_use]
    pub fn host_channel_name(&self) -> String {
        format!("{HOST_CHANNEL_PREFIX}{}", self.api_key)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            experiment_ids: None,
            auto_start: true,
            reduce_flicker: true,
            reveal_timeout_ms: DEFAULT_REVEAL_TIMEOUT_MS,
            image_override_attributes: vec!["srcset".to_string()],
            nonce: None,
            override_user: None,
            client: ClientOptions {
                auto_capture: true,
                ..ClientOptions::default()
            },
        }
    }
}
