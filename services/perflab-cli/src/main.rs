use clap::{Parser, Subcommand};
use perflab_core::{
    write_summary, GreeterServiceCall, GrpcRequest, LoadDriver, LoadMetrics, LoggingConfig,
    MaximumLoadSearch, MetricsAggregator, PerfLabConfig, PerfLabResult, ReliabilityEvaluator,
    SmokeTest, StepLoadSearch,
};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "perflab")]
#[command(about = "Load and reliability testing for gRPC Greeter services", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, global = true, env = "PERFLAB_CONFIG")]
    config: Option<PathBuf>,

    /// Target endpoint, overriding target.endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Write the JSON summary of the run to this file
    #[arg(long, global = true)]
    summary_out: Option<PathBuf>,

    /// Write the client-side Prometheus metrics to this file after the run
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search for the maximum sustainable request rate
    MaxLoad {
        /// First rate probed (RPS)
        #[arg(long)]
        initial_load: Option<u32>,
    },

    /// Hold a target rate and judge its stability over time
    Reliability {
        /// Rate to sustain (RPS)
        #[arg(long)]
        target_load: Option<u32>,

        /// Steady-state duration in seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Step the rate up from a baseline until the target saturates
    StepLoad,

    /// Short fixed-concurrency run against the target
    Smoke {
        /// Closed-loop virtual users
        #[arg(long)]
        users: Option<usize>,
    },

    /// Write the default configuration as a template
    GenerateConfig {
        /// Output configuration file path
        #[arg(long, default_value = "perflab.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        let template = PerfLabConfig::default().to_template()?;
        std::fs::write(output, template)?;
        println!("Configuration template written to: {}", output.display());
        println!("\nEdit the file and use it with:");
        println!("  perflab --config {} max-load", output.display());
        return Ok(());
    }

    let mut config = PerfLabConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    init_logging(&config.logging);

    let metrics = Arc::new(LoadMetrics::new()?);
    let mut driver = build_driver(&config, Arc::clone(&metrics))?;

    let passed = match cli.command {
        Commands::MaxLoad { .. } => {
            let mut search = MaximumLoadSearch::new(driver, config.search.clone());
            let report = search.run().await;
            finish(&report, report.passed(), cli.summary_out.as_deref())?
        }
        Commands::Reliability { .. } => {
            let report = ReliabilityEvaluator::new(config.reliability.clone())
                .run(&mut driver)
                .await;
            finish(&report, report.passed(), cli.summary_out.as_deref())?
        }
        Commands::StepLoad => {
            let mut search = StepLoadSearch::new(driver, config.step.clone());
            let report = search.run().await;
            finish(&report, report.passed, cli.summary_out.as_deref())?
        }
        Commands::Smoke { .. } => {
            let report = SmokeTest::new(config.smoke.clone()).run(&driver).await;
            finish(&report, report.passed, cli.summary_out.as_deref())?
        }
        Commands::GenerateConfig { .. } => true,
    };

    if let Some(path) = &cli.metrics_out {
        std::fs::write(path, metrics.export())?;
        tracing::info!("Metrics written to {}", path.display());
    }

    if !passed {
        std::process::exit(1);
    }

    Ok(())
}

fn apply_overrides(config: &mut PerfLabConfig, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.target.endpoint = endpoint.clone();
    }

    match &cli.command {
        Commands::MaxLoad {
            initial_load: Some(initial_load),
        } => config.search.initial_load = *initial_load,
        Commands::Reliability {
            target_load,
            duration_secs,
        } => {
            if let Some(target_load) = target_load {
                config.reliability.target_load = *target_load;
            }
            if let Some(duration_secs) = duration_secs {
                config.reliability.test_duration_secs = *duration_secs;
            }
        }
        Commands::Smoke { users: Some(users) } => config.smoke.users = *users,
        _ => {}
    }
}

fn build_driver(config: &PerfLabConfig, metrics: Arc<LoadMetrics>) -> PerfLabResult<LoadDriver> {
    let client = GreeterServiceCall::connect_lazy(&config.target)?;
    let request = GrpcRequest::from_config(&config.target)?;
    let aggregator = MetricsAggregator::new()?.with_exporter(metrics);

    Ok(LoadDriver::new(
        Arc::new(client),
        request,
        Arc::new(aggregator),
        config.driver.workers,
    ))
}

/// Print the report, write its summary if requested, and hand back the verdict.
fn finish<R: Display + Serialize>(
    report: &R,
    passed: bool,
    summary_out: Option<&Path>,
) -> PerfLabResult<bool> {
    println!("\n{report}\n");

    if let Some(path) = summary_out {
        write_summary(report, path)?;
        tracing::info!("Summary written to {}", path.display());
    }

    Ok(passed)
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = fmt().with_env_filter(env_filter).with_target(false);

    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
