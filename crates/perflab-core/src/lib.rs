//! Load generation, maximum-load search and reliability evaluation for gRPC Greeter services.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod measurement;
pub mod metrics;
pub mod pool;
pub mod reliability;
pub mod report;
pub mod search;
pub mod smoke;
pub mod stability;
pub mod step_search;

pub use aggregator::MetricsAggregator;
pub use client::{GreeterServiceCall, GrpcRequest, GrpcResponse, RpcClient};
pub use config::{
    DriverConfig, LoggingConfig, PerfLabConfig, ReliabilityConfig, SearchConfig, SmokeConfig,
    StepLoadConfig, TargetConfig,
};
pub use driver::{LoadDriver, LoadPlan, LoadProbe};
pub use error::{PerfLabError, PerfLabResult};
pub use measurement::{LatencySummary, Measurement, StabilityWindow};
pub use metrics::LoadMetrics;
pub use pool::{TokioWorkerPool, WorkerPool, WorkerTask};
pub use reliability::{ReliabilityEvaluator, ReliabilityReport, ReliabilityVerdict};
pub use report::{to_summary_json, write_summary};
pub use search::{
    MaximumLoadReport, MaximumLoadSearch, SearchPhase, SearchRound, VerificationOutcome,
};
pub use smoke::{SmokeReport, SmokeTest};
pub use stability::StabilityEvaluator;
pub use step_search::{StepLoadReport, StepLoadSearch, StepResult, StopReason, ValidationRun};
