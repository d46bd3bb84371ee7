//! Process Metrics CLI
//!
//! Command-line interface for the metric log:
//! - Record process and flow node events
//! - Read the metrics of one or all process models
//! - Archive a process model's metrics
//! - Generate a default config file

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use process_metrics::config::{generate_default_config, Config, LoggingConfig};
use process_metrics::storage::{MeasurementPoint, MetricLogEngine, MetricRecord, RecordedError};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "process-metrics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Append-only lifecycle metric log for process executions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the metric output directory
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a lifecycle event
    Record {
        #[command(subcommand)]
        event: RecordEvent,
    },

    /// Read the metrics of a process model
    Read {
        /// Process model id
        #[arg(required_unless_present = "all")]
        model: Option<String>,
        /// Read every process model in the output directory
        #[arg(long, conflicts_with = "model")]
        all: bool,
    },

    /// Move a process model's metrics into the archive
    Archive {
        /// Process model id
        model: String,
    },

    /// List process models that have metrics
    Models,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum RecordEvent {
    /// Event of a process instance (onProcessStart, onProcessFinish, onProcessError)
    Process {
        model: String,
        correlation: String,
        instance: String,
        /// Measurement point name
        point: String,
        #[command(flatten)]
        common: EventArgs,
    },

    /// Event of a flow node instance (onFlowNodeEnter, onFlowNodeExit, ...)
    FlowNode {
        model: String,
        correlation: String,
        instance: String,
        flow_node_instance: String,
        flow_node: String,
        /// Measurement point name
        point: String,
        /// Token payload as JSON
        #[arg(short, long, default_value = "{}")]
        payload: String,
        #[command(flatten)]
        common: EventArgs,
    },
}

#[derive(Args)]
pub struct EventArgs {
    /// Event time (default: now). Supports: "now", ISO 8601, Unix timestamp in ms
    #[arg(short, long)]
    pub time: Option<String>,

    /// Name of the error that occurred
    #[arg(long, requires = "error_message")]
    pub error_name: Option<String>,

    /// Message of the error that occurred
    #[arg(long)]
    pub error_message: Option<String>,
}

impl EventArgs {
    fn timestamp(&self) -> anyhow::Result<DateTime<Utc>> {
        parse_time(self.time.as_deref())
    }

    fn error(&self) -> Option<RecordedError> {
        self.error_message.as_ref().map(|message| {
            RecordedError::new(self.error_name.as_deref().unwrap_or("Error"), message.as_str())
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(output_dir) = &cli.output_dir {
        config.storage.output_dir = output_dir.clone();
    }

    init_tracing(&config.logging);

    let engine = MetricLogEngine::new(config.storage.to_log_config()?);
    tracing::debug!("Output directory: {:?}", engine.output_dir());

    match cli.command {
        Commands::Record { event } => {
            let record = build_record(event)?;
            engine.append(&record).await?;
            println!(
                "Recorded {} for {} at {}",
                record.measurement_point,
                record.process_model_id,
                record.timestamp.to_rfc3339()
            );
        }

        Commands::Read { model, all } => {
            let records = match (model, all) {
                (_, true) => engine.read_all_models().await?,
                (Some(model), false) => engine.read_all(&model).await?,
                (None, false) => bail!("a process model id or --all is required"),
            };

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&records)?),
                _ => print_table(&records),
            }
        }

        Commands::Archive { model } => match engine.archive(&model).await? {
            Some(destination) => println!("Archived {} to {}", model, destination.display()),
            None => println!("No metrics recorded for {}", model),
        },

        Commands::Models => {
            for model in engine.list_models().await? {
                println!("{}", model);
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("process_metrics={}", logging.level)));

    // Logs go to stderr so `read --format json` output stays parseable
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_record(event: RecordEvent) -> anyhow::Result<MetricRecord> {
    let record = match event {
        RecordEvent::Process {
            model,
            correlation,
            instance,
            point,
            common,
        } => {
            let point: MeasurementPoint = point.parse()?;
            if point.is_flow_node() {
                bail!("{} is a flow node measurement point", point);
            }
            let record = MetricRecord::process(common.timestamp()?, correlation, instance, model, point);
            match common.error() {
                Some(error) => record.with_error(error),
                None => record,
            }
        }

        RecordEvent::FlowNode {
            model,
            correlation,
            instance,
            flow_node_instance,
            flow_node,
            point,
            payload,
            common,
        } => {
            let point: MeasurementPoint = point.parse()?;
            if !point.is_flow_node() {
                bail!("{} is a process measurement point", point);
            }
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let record = MetricRecord::flow_node(
                common.timestamp()?,
                correlation,
                instance,
                model,
                flow_node_instance,
                flow_node,
                point,
                payload,
            );
            match common.error() {
                Some(error) => record.with_error(error),
                None => record,
            }
        }
    };

    Ok(record)
}

fn parse_time(time: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match time {
        None | Some("now") => Ok(Utc::now()),
        Some(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Ok(dt.with_timezone(&Utc))
            } else if let Some(dt) = s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis) {
                Ok(dt)
            } else {
                bail!("Invalid timestamp format: {}", s)
            }
        }
    }
}

fn print_table(records: &[MetricRecord]) {
    if records.is_empty() {
        println!("No metrics found.");
        return;
    }

    println!(
        "{:<26} {:<18} {:<20} {:<20} {:<24} {}",
        "TIMESTAMP", "POINT", "CORRELATION", "INSTANCE", "FLOW NODE", "ERROR"
    );
    println!("{}", "-".repeat(120));

    for record in records {
        println!(
            "{:<26} {:<18} {:<20} {:<20} {:<24} {}",
            record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.measurement_point.as_str(),
            truncate(&record.correlation_id, 20),
            truncate(record.process_instance_id.as_deref().unwrap_or("-"), 20),
            truncate(record.flow_node_id().unwrap_or("-"), 24),
            record
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default()
        );
    }

    println!();
    println!("{} metrics", records.len());
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
