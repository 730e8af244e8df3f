//! Command-line interface for reqspan.
//!
//! Runs a simulated three-stage search pipeline (LLM query transformation,
//! search backend call, result formatting) under tracing and prints the
//! per-request performance summary. Useful for eyeballing report output and
//! for timing comparisons across repeated runs.

use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::core::config::ConfigBuilder;
use crate::core::{Config, ReqspanError, RequestId, Result};
use crate::report::{self, ReportOptions, TraceReport};
use crate::{measure, registry};

/// Request-stage timing demo and diagnostics.
#[derive(Parser, Debug)]
#[command(name = "reqspan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Request id for the simulated request (generated when omitted)
    #[arg(long, env = "REQSPAN_REQUEST_ID")]
    pub request_id: Option<String>,

    /// Number of pipeline iterations to run
    #[arg(short, long, env = "REQSPAN_ITERATIONS", default_value = "1")]
    pub iterations: usize,

    /// Print the response payload with the embedded JSON report instead of
    /// the console table
    #[arg(long, env = "REQSPAN_JSON")]
    pub json: bool,

    /// Inject a failure into the named stage (query_transform,
    /// search_backend or format_results)
    #[arg(long, env = "REQSPAN_FAIL_STAGE")]
    pub fail_stage: Option<String>,

    /// Slow-request threshold in milliseconds (overrides config)
    #[arg(long, env = "REQSPAN_SLOW_THRESHOLD_MS")]
    pub slow_threshold_ms: Option<u64>,

    /// Configuration file path (default: ~/.config/reqspan/config.yaml)
    #[arg(short, long, env = "REQSPAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "REQSPAN_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = Config::default_path();
            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
            },
            Err(e) if self.config.is_some() => {
                // User explicitly specified a config file that doesn't exist
                return Err(ReqspanError::config(format!(
                    "failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {},
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(ms) = self.slow_threshold_ms {
            builder = builder.slow_request_threshold(Duration::from_millis(ms));
        }
        builder = builder.debug(self.debug);
        builder.build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("REQSPAN_LOG_LEVEL").ok();
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level
                .as_deref()
                .unwrap_or_else(|| config.logging.level.as_filter_str())
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ReqspanError::config(format!("failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Error injected into a simulated pipeline stage.
#[derive(Debug)]
struct StageError(&'static str);

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} failed (injected)", self.0)
    }
}

impl std::error::Error for StageError {}

const DEMO_QUERY: &str = "European technology companies with high growth";

/// Runs the simulated pipeline. The real pipeline is an external
/// collaborator; this stands in for it with fixed-length stages so the
/// measurement surface can be exercised end to end.
fn simulated_pipeline(
    fail_stage: Option<&str>,
) -> std::result::Result<serde_json::Value, StageError> {
    // LLM query transformation
    let es_query = {
        let mut span = measure::scope("query_transform").with_meta("model", "demo-llm");
        span.record("input_chars", DEMO_QUERY.len() as i64);
        thread::sleep(Duration::from_millis(8));
        if fail_stage == Some("query_transform") {
            let err = StageError("query_transform");
            span.fail(err.to_string());
            return Err(err);
        }
        serde_json::json!({"query": {"match": {"description": DEMO_QUERY}}})
    };

    // Search backend call
    let hits = measure::traced("search_backend", || {
        thread::sleep(Duration::from_millis(15));
        if fail_stage == Some("search_backend") {
            return Err(StageError("search_backend"));
        }
        Ok(vec!["ASML", "SAP", "Adyen"])
    })?;

    // Result formatting
    measure::traced("format_results", || {
        thread::sleep(Duration::from_millis(3));
        if fail_stage == Some("format_results") {
            return Err(StageError("format_results"));
        }
        Ok(serde_json::json!({
            "es_query": es_query,
            "result_count": hits.len(),
            "hits": hits,
        }))
    })
}

/// Execute the reqspan CLI.
pub fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    cli.init_logging(&config)?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!(
            "  Slow-request threshold: {}ms",
            config.slow_request_threshold.as_millis()
        );
        println!("  Operation column width: {}", config.report.operation_width);
        println!("  Include metadata: {}", config.report.include_metadata);
        return Ok(());
    }

    let threshold = cli
        .slow_threshold_ms
        .map(Duration::from_millis)
        .unwrap_or(config.slow_request_threshold);
    let options = ReportOptions::from(&config.report);
    let iterations = cli.iterations.max(1);

    let mut totals = Vec::with_capacity(iterations);
    for iteration in 0..iterations {
        let request_id = match &cli.request_id {
            Some(id) if iterations == 1 => RequestId::new(id.clone())?,
            Some(id) => RequestId::new(format!("{}_{}", id, iteration + 1))?,
            None => RequestId::generate(),
        };

        let handle = registry::begin(request_id)?;
        let outcome = simulated_pipeline(cli.fail_stage.as_deref());
        let trace = registry::end(handle)?;

        match outcome {
            Ok(mut payload) => {
                let report = TraceReport::from_trace(&trace);
                report::augment_response(&mut payload, &report)?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                } else {
                    print!("{}", report::render_summary(&trace, &options));
                }
            },
            Err(e) => {
                tracing::error!(error = %e, request_id = %trace.request_id, "pipeline failed");
                if cli.json {
                    let report = TraceReport::from_trace(&trace);
                    println!("{}", serde_json::to_string_pretty(&report.to_value()?)?);
                } else {
                    print!("{}", report::render_summary(&trace, &options));
                }
            },
        }

        report::log_if_slow(&trace, threshold);
        totals.push(trace.total_duration_ms());
    }

    if iterations > 1 {
        print_aggregate(&totals);
    }

    Ok(())
}

/// Prints min/avg/max totals across repeated runs.
fn print_aggregate(totals: &[f64]) {
    let avg = totals.iter().sum::<f64>() / totals.len() as f64;
    let min = totals.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = totals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    println!();
    println!("PERFORMANCE SUMMARY ({} iterations)", totals.len());
    println!("Average time: {:.2}ms", avg);
    println!("Min time: {:.2}ms", min);
    println!("Max time: {:.2}ms", max);
    println!("Time range: {:.2}ms", max - min);
}
