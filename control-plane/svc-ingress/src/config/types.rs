use std::time::Duration;

use envconfig::Envconfig;

use crate::controller::types::UpdateFilter;

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    /// Number of reconcile workers draining the queue.
    /// Env: SVC_INGRESS_WORKERS
    #[envconfig(from = "SVC_INGRESS_WORKERS", default = "5")]
    pub workers: usize,

    /// A failing key is requeued while its requeue count is <= this bound.
    /// Env: SVC_INGRESS_MAX_RETRY
    #[envconfig(from = "SVC_INGRESS_MAX_RETRY", default = "10")]
    pub max_retry: u32,

    /// Watch a single namespace instead of the whole cluster.
    /// Env: SVC_INGRESS_WATCH_NAMESPACE
    #[envconfig(from = "SVC_INGRESS_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Service update suppression: "relevant" or "full".
    /// Env: SVC_INGRESS_UPDATE_FILTER
    #[envconfig(from = "SVC_INGRESS_UPDATE_FILTER", default = "relevant")]
    pub update_filter: String,

    /// Upper bound for a single create/delete round-trip.
    /// Env: SVC_INGRESS_CALL_TIMEOUT_SECS
    #[envconfig(from = "SVC_INGRESS_CALL_TIMEOUT_SECS", default = "30")]
    pub call_timeout_secs: u64,

    #[envconfig(nested)]
    pub ingress: IngressConfig,

    #[envconfig(nested)]
    pub backoff: BackoffConfig,
}

/// Static inputs of the Ingress built for an annotated Service.
#[derive(Envconfig, Clone, Debug)]
pub struct IngressConfig {
    #[envconfig(from = "SVC_INGRESS_ANNOTATION", default = "ingress/http")]
    pub annotation: String,
    #[envconfig(from = "SVC_INGRESS_HOST", default = "mk1001.local")]
    pub host: String,
    #[envconfig(from = "SVC_INGRESS_CLASS", default = "nginx")]
    pub class_name: String,
    #[envconfig(from = "SVC_INGRESS_FIELD_MANAGER", default = "svc-ingress")]
    pub field_manager: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            annotation: "ingress/http".into(),
            host: "mk1001.local".into(),
            class_name: "nginx".into(),
            field_manager: "svc-ingress".into(),
        }
    }
}

/// Per-key exponential backoff used by rate-limited requeues.
#[derive(Envconfig, Clone, Debug)]
pub struct BackoffConfig {
    #[envconfig(from = "SVC_INGRESS_BACKOFF_BASE_MS", default = "5")]
    pub base_delay_ms: u64,
    #[envconfig(from = "SVC_INGRESS_BACKOFF_MAX_SECS", default = "1000")]
    pub max_delay_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_secs: 1000,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("backoff base delay {base:?} exceeds max delay {max:?}")]
    BackoffInverted { base: Duration, max: Duration },
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_retry: 10,
            watch_namespace: None,
            update_filter: UpdateFilter::Relevant.to_string(),
            call_timeout_secs: 30,
            ingress: IngressConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Reject settings the controller cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        let (base, max) = (self.backoff.base_delay(), self.backoff.max_delay());
        if base > max {
            return Err(ConfigError::BackoffInverted { base, max });
        }
        Ok(self)
    }

    pub fn update_filter(&self) -> UpdateFilter {
        UpdateFilter::from_str(&self.update_filter)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
