//! # Process Metrics
//!
//! Append-only lifecycle metric log for process executions. Every process
//! model gets its own `.met` file; each line records one event (process
//! started, flow node entered, error, ...).
//!
//! ## Features
//!
//! - **Append-only**: one line per event, written immediately
//! - **Versioned format**: new lines use the V2 layout, V1 history stays readable
//! - **Tolerant reads**: comments, blank and unreadable lines are skipped
//! - **Archiving**: a model's log is moved aside under a timestamped name
//!
//! ## Modules
//!
//! - [`storage`]: Record types, line codec and the metric log engine
//! - [`recorder`]: One method per lifecycle event on top of a repository
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use process_metrics::recorder::{MetricsRecorder, ProcessRef};
//! use process_metrics::storage::{MetricLogConfig, MetricLogEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = MetricLogEngine::new(MetricLogConfig::new("./metrics"));
//!     let recorder = MetricsRecorder::new(Arc::new(engine));
//!
//!     let process = ProcessRef::new("correlation-1", "instance-1", "Invoice");
//!     recorder.on_process_started(&process, Utc::now()).await?;
//!     recorder.on_process_finished(&process, Utc::now()).await?;
//!
//!     let metrics = recorder.read_metrics("Invoice").await?;
//!     println!("Found {} metrics", metrics.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod recorder;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    CodecError, FlowNodeRef, LineTag, MeasurementPoint, MetricLogConfig, MetricLogEngine,
    MetricRecord, MetricsRepository, RecordedError, SchemaVersion, StorageError, StorageResult,
};

pub use recorder::{MetricsRecorder, ProcessRef};

pub use config::{Config, ConfigError, LoggingConfig, StorageConfig};
