//! Configuration management for perflab
//!
//! Every tunable of the load tests lives here. Sources, lowest priority first:
//! - Built-in defaults
//! - ./config/perflab.{toml,yaml}
//! - File named by `PERFLAB_CONFIG` or passed explicitly
//! - Environment variables (`PERFLAB__SEARCH__INITIAL_LOAD=2000`)

use config::{Config, ConfigError, Environment, File};
use perflab_proto::{HelloRequest, SAY_HELLO_METHOD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PerfLabError, PerfLabResult};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct PerfLabConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub step: StepLoadConfig,

    #[serde(default)]
    pub smoke: SmokeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PerfLabConfig {
    /// Load configuration with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. `explicit` path, or the file named by PERFLAB_CONFIG
    /// 3. ./config/perflab
    /// 4. Defaults (lowest priority)
    pub fn load(explicit: Option<&Path>) -> PerfLabResult<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("./config/perflab").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        } else if let Ok(config_path) = std::env::var("PERFLAB_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        // Example: PERFLAB__RELIABILITY__TARGET_LOAD=15000
        builder = builder.add_source(
            Environment::with_prefix("PERFLAB")
                .separator("__")
                .try_parsing(true),
        );

        let config: PerfLabConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a single file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Render the configuration as a commented TOML template.
    pub fn to_template(&self) -> PerfLabResult<String> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!(
            "# perflab configuration\n\
             # Every key can be overridden with PERFLAB__<SECTION>__<KEY> \
             environment variables.\n\n{body}"
        ))
    }

    /// Validate configuration values
    pub fn validate(&self) -> PerfLabResult<()> {
        self.target.validate()?;

        if self.driver.workers == 0 {
            return Err(PerfLabError::invalid_config("driver.workers must be > 0"));
        }

        self.search.validate()?;
        self.reliability.validate()?;
        self.step.validate()?;
        self.smoke.validate()?;

        Ok(())
    }
}

/// Target endpoint and request shape
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    /// Plaintext endpoint URI, e.g. `http://localhost:50051`
    pub endpoint: String,

    /// Fully qualified method route
    pub method: String,

    /// Request message as JSON
    pub request_json: String,

    /// Per-call deadline in milliseconds
    pub deadline_ms: u64,

    pub connect_timeout_ms: u64,

    /// HTTP/2 keep-alive ping interval
    pub keep_alive_interval_secs: u64,

    /// How long to wait for a keep-alive ping acknowledgement
    pub keep_alive_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:50051".to_string(),
            method: SAY_HELLO_METHOD.to_string(),
            request_json: r#"{"name":"World"}"#.to_string(),
            deadline_ms: 1000,
            connect_timeout_ms: 5000,
            keep_alive_interval_secs: 30,
            keep_alive_timeout_secs: 10,
        }
    }
}

impl TargetConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    /// Parse `request_json` into the request message.
    pub fn request(&self) -> PerfLabResult<HelloRequest> {
        Ok(serde_json::from_str(&self.request_json)?)
    }

    fn validate(&self) -> PerfLabResult<()> {
        if !self.endpoint.starts_with("http://") {
            return Err(PerfLabError::invalid_config(format!(
                "target.endpoint must be a plaintext http:// URI, got `{}`",
                self.endpoint
            )));
        }

        if self.method.is_empty() {
            return Err(PerfLabError::invalid_config("target.method cannot be empty"));
        }

        if self.deadline_ms == 0 {
            return Err(PerfLabError::invalid_config("target.deadline_ms must be > 0"));
        }

        self.request()?;
        Ok(())
    }
}

/// Virtual user pool
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of concurrent workers sharing the target rate
    pub workers: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { workers: 64 }
    }
}

/// Maximum-load search tunables
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// First rate probed by the approximate phase (RPS)
    pub initial_load: u32,

    /// Rate increment of the approximate phase
    pub large_step: u32,

    /// Bracket width at which the binary search stops
    pub small_step: u32,

    /// Duration of the first measurement at a rate
    pub step_duration_secs: u64,

    /// Duration of each follow-up measurement at a rate
    pub stability_check_duration_secs: u64,

    /// Maximum relative throughput spread, (max - min) / avg
    pub stability_threshold: f64,

    pub required_stable_measurements: usize,

    /// Fraction of the target rate that must actually be achieved
    pub min_efficiency_ratio: f64,

    /// Throughput growth below this factor counts as diminishing returns
    pub min_throughput_growth_ratio: f64,

    /// Reduced-rate attempts after a failed verification
    pub verification_retries: u32,

    /// Rate multiplier applied on each verification retry
    pub verification_backoff_ratio: f64,

    /// Share of verified throughput recommended for sustained use
    pub recommended_load_ratio: f64,

    /// The approximate phase never probes above this rate
    pub max_load_ceiling: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_load: 1000,
            large_step: 1000,
            small_step: 500,
            step_duration_secs: 60,
            stability_check_duration_secs: 30,
            stability_threshold: 0.1,
            required_stable_measurements: 2,
            min_efficiency_ratio: 0.95,
            min_throughput_growth_ratio: 1.1,
            verification_retries: 1,
            verification_backoff_ratio: 0.9,
            recommended_load_ratio: 0.8,
            max_load_ceiling: 1_000_000,
        }
    }
}

impl SearchConfig {
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs(self.step_duration_secs)
    }

    pub fn stability_check_duration(&self) -> Duration {
        Duration::from_secs(self.stability_check_duration_secs)
    }

    fn validate(&self) -> PerfLabResult<()> {
        if self.initial_load == 0 || self.large_step == 0 || self.small_step == 0 {
            return Err(PerfLabError::invalid_config(
                "search.initial_load, search.large_step and search.small_step must be > 0",
            ));
        }

        if self.small_step > self.large_step {
            return Err(PerfLabError::invalid_config(
                "search.small_step must be <= search.large_step",
            ));
        }

        if self.step_duration_secs == 0 || self.stability_check_duration_secs == 0 {
            return Err(PerfLabError::invalid_config(
                "search measurement durations must be > 0",
            ));
        }

        if self.required_stable_measurements == 0 {
            return Err(PerfLabError::invalid_config(
                "search.required_stable_measurements must be > 0",
            ));
        }

        if self.stability_threshold < 0.0 {
            return Err(PerfLabError::invalid_config(
                "search.stability_threshold must be >= 0",
            ));
        }

        check_ratio("search.min_efficiency_ratio", self.min_efficiency_ratio)?;
        check_ratio("search.verification_backoff_ratio", self.verification_backoff_ratio)?;
        check_ratio("search.recommended_load_ratio", self.recommended_load_ratio)?;

        if self.min_throughput_growth_ratio < 1.0 {
            return Err(PerfLabError::invalid_config(
                "search.min_throughput_growth_ratio must be >= 1.0",
            ));
        }

        if self.max_load_ceiling < self.initial_load {
            return Err(PerfLabError::invalid_config(
                "search.max_load_ceiling must be >= search.initial_load",
            ));
        }

        Ok(())
    }
}

/// Sustained reliability run tunables
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Rate held for the whole run (RPS)
    pub target_load: u32,

    /// Steady-state duration, excluding ramp-up
    pub test_duration_secs: u64,

    pub ramp_up_duration_secs: u64,

    /// Size of each evaluated window
    pub measurement_window_secs: u64,

    pub max_error_rate: f64,

    /// Allowed throughput spread, both per window and across the run
    pub max_throughput_variance: f64,

    pub max_p99_latency_ms: f64,

    pub required_stable_windows: usize,

    /// Lower throughput bound of a stable window, as a fraction of the target
    pub window_lower_bound_ratio: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            target_load: 20302,
            test_duration_secs: 30 * 60,
            ramp_up_duration_secs: 5 * 60,
            measurement_window_secs: 5 * 60,
            max_error_rate: 0.01,
            max_throughput_variance: 0.1,
            max_p99_latency_ms: 500.0,
            required_stable_windows: 6,
            window_lower_bound_ratio: 0.9,
        }
    }
}

impl ReliabilityConfig {
    pub fn test_duration(&self) -> Duration {
        Duration::from_secs(self.test_duration_secs)
    }

    pub fn ramp_up_duration(&self) -> Duration {
        Duration::from_secs(self.ramp_up_duration_secs)
    }

    pub fn measurement_window(&self) -> Duration {
        Duration::from_secs(self.measurement_window_secs)
    }

    /// Number of windows the steady-state run is partitioned into.
    pub fn window_count(&self) -> usize {
        if self.measurement_window_secs == 0 {
            return 0;
        }
        self.test_duration_secs.div_ceil(self.measurement_window_secs) as usize
    }

    fn validate(&self) -> PerfLabResult<()> {
        if self.target_load == 0 {
            return Err(PerfLabError::invalid_config(
                "reliability.target_load must be > 0",
            ));
        }

        if self.test_duration_secs == 0 || self.measurement_window_secs == 0 {
            return Err(PerfLabError::invalid_config(
                "reliability.test_duration_secs and measurement_window_secs must be > 0",
            ));
        }

        check_ratio("reliability.max_error_rate", self.max_error_rate)?;
        check_ratio(
            "reliability.window_lower_bound_ratio",
            self.window_lower_bound_ratio,
        )?;

        if self.max_throughput_variance < 0.0 || self.max_p99_latency_ms <= 0.0 {
            return Err(PerfLabError::invalid_config(
                "reliability.max_throughput_variance must be >= 0 and max_p99_latency_ms > 0",
            ));
        }

        Ok(())
    }
}

/// Step-load saturation search tunables
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StepLoadConfig {
    pub baseline_rate: u32,

    pub baseline_duration_secs: u64,

    /// First rate after the baseline
    pub start_rate: u32,

    pub ramp_up_secs: u64,

    pub step_duration_secs: u64,

    /// Error rate that stops the search
    pub error_threshold: f64,

    /// p99 above baseline p99 times this stops the search
    pub latency_multiplier: f64,

    /// Relative throughput improvement below this stops the search
    pub plateau_threshold: f64,

    /// Relative rate growth once saturation has been observed
    pub saturated_growth: f64,

    pub rate_ceiling: u32,

    /// Hold duration of the 90% validation run
    pub validation_duration_secs: u64,

    pub full_validation_duration_secs: u64,

    pub overload_validation_duration_secs: u64,
}

impl Default for StepLoadConfig {
    fn default() -> Self {
        Self {
            baseline_rate: 100,
            baseline_duration_secs: 3 * 60,
            start_rate: 200,
            ramp_up_secs: 30,
            step_duration_secs: 2 * 60,
            error_threshold: 0.001,
            latency_multiplier: 10.0,
            plateau_threshold: 0.05,
            saturated_growth: 0.2,
            rate_ceiling: 1_000_000,
            validation_duration_secs: 10 * 60,
            full_validation_duration_secs: 5 * 60,
            overload_validation_duration_secs: 3 * 60,
        }
    }
}

impl StepLoadConfig {
    pub fn baseline_duration(&self) -> Duration {
        Duration::from_secs(self.baseline_duration_secs)
    }

    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_secs)
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_secs(self.step_duration_secs)
    }

    fn validate(&self) -> PerfLabResult<()> {
        if self.baseline_rate == 0 || self.start_rate == 0 {
            return Err(PerfLabError::invalid_config(
                "step.baseline_rate and step.start_rate must be > 0",
            ));
        }

        if self.baseline_duration_secs == 0 || self.step_duration_secs == 0 {
            return Err(PerfLabError::invalid_config(
                "step durations must be > 0",
            ));
        }

        check_ratio("step.error_threshold", self.error_threshold)?;

        if self.latency_multiplier <= 1.0 {
            return Err(PerfLabError::invalid_config(
                "step.latency_multiplier must be > 1.0",
            ));
        }

        if self.saturated_growth <= 0.0 {
            return Err(PerfLabError::invalid_config(
                "step.saturated_growth must be > 0",
            ));
        }

        Ok(())
    }
}

/// Fixed-concurrency smoke test tunables
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SmokeConfig {
    /// Closed-loop virtual users
    pub users: usize,

    pub ramp_up_secs: u64,

    pub duration_secs: u64,

    pub max_p99_latency_ms: f64,

    pub max_error_rate: f64,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            users: 10,
            ramp_up_secs: 30,
            duration_secs: 5 * 60,
            max_p99_latency_ms: 1000.0,
            max_error_rate: 0.01,
        }
    }
}

impl SmokeConfig {
    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    fn validate(&self) -> PerfLabResult<()> {
        if self.users == 0 || self.duration_secs == 0 {
            return Err(PerfLabError::invalid_config(
                "smoke.users and smoke.duration_secs must be > 0",
            ));
        }
        check_ratio("smoke.max_error_rate", self.max_error_rate)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,

    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn check_ratio(key: &str, value: f64) -> PerfLabResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PerfLabError::invalid_config(format!(
            "{key} must be within [0, 1], got {value}"
        )))
    }
}
