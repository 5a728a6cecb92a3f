use std::time::Duration;

/// Runtime settings, read from `TETHER_*` environment variables and then
/// overridden by command line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Restrict every watch to one namespace; all namespaces when unset.
    pub namespace: Option<String>,
    /// Reconciliations allowed in flight per custom-task kind.
    pub custom_task_concurrency: usize,
    /// Backoff applied by the error policy.
    pub error_requeue: Duration,
    /// Delay before retrying a PipelineRun that is being reconciled elsewhere.
    pub busy_requeue: Duration,
    /// PipelineRun timeout when the object does not set one.
    pub default_pipeline_timeout: Duration,
    /// Also reconcile the legacy `tekton.dev/v1alpha1` Run kind.
    pub legacy_runs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            custom_task_concurrency: 1,
            error_requeue: Duration::from_secs(10),
            busy_requeue: Duration::from_millis(500),
            default_pipeline_timeout: Duration::from_secs(60 * 60),
            legacy_runs: false,
        }
    }
}

fn minutes(m: u64) -> Option<Duration> { m.checked_mul(60).map(Duration::from_secs) }

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> { std::env::var(key).ok().and_then(|s| s.parse().ok()) }

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namespace: std::env::var("TETHER_NAMESPACE").ok().filter(|s| !s.is_empty()),
            custom_task_concurrency: env_parse::<usize>("TETHER_CUSTOM_TASK_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.custom_task_concurrency),
            error_requeue: env_parse("TETHER_REQUEUE_SECS").map(Duration::from_secs).unwrap_or(defaults.error_requeue),
            busy_requeue: env_parse("TETHER_BUSY_REQUEUE_MS").map(Duration::from_millis).unwrap_or(defaults.busy_requeue),
            default_pipeline_timeout: env_parse::<u64>("TETHER_DEFAULT_PIPELINE_TIMEOUT_MINS")
                .and_then(minutes)
                .unwrap_or(defaults.default_pipeline_timeout),
            legacy_runs: std::env::var("TETHER_LEGACY_RUNS")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.legacy_runs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_custom_tasks() {
        let cfg = Config::default();
        assert_eq!(cfg.custom_task_concurrency, 1);
        assert_eq!(cfg.default_pipeline_timeout, Duration::from_secs(3600));
        assert!(!cfg.legacy_runs);
        assert!(cfg.namespace.is_none());
    }

    #[test]
    fn oversized_minute_counts_are_rejected() {
        assert_eq!(minutes(90), Some(Duration::from_secs(5400)));
        assert_eq!(minutes(0), Some(Duration::ZERO));
        assert_eq!(minutes(u64::MAX), None);
    }
}
