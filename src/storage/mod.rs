//! Metric log storage
//!
//! This module provides the file backed metric log:
//!
//! - **types**: Core data structures (MetricRecord, MeasurementPoint)
//! - **error_codec**: Recorded errors as delimiter-safe tokens
//! - **codec**: Versioned line format (write V2, read V1 and V2)
//! - **adapter**: File system access (append, read, archive move)
//! - **engine**: Metric log engine orchestrating all components
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   MetricRecord → encode (V2) → append line → <output>/<model>.met
//!
//! Read Path:
//!   <model>.met → split lines → decode (V1/V2) → drop unreadable → records
//!
//! Archive Path:
//!   <model>.met → rename → <archive>/<model>-<timestamp>.met
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use process_metrics::storage::{MeasurementPoint, MetricLogConfig, MetricLogEngine, MetricRecord};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = MetricLogEngine::new(MetricLogConfig::new("./metrics"));
//!
//!     let record = MetricRecord::process(
//!         Utc::now(),
//!         "correlation-1",
//!         "instance-1",
//!         "Invoice",
//!         MeasurementPoint::ProcessStarted,
//!     );
//!     engine.append(&record).await?;
//!
//!     let records = engine.read_all("Invoice").await?;
//!     println!("{} records", records.len());
//!
//!     engine.archive("Invoice").await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod codec;
pub mod engine;
pub mod error;
pub mod error_codec;
pub mod types;

// Re-export commonly used types
pub use codec::{LineTag, SchemaVersion};
pub use engine::{MetricLogConfig, MetricLogEngine, MetricsRepository};
pub use error::{CodecError, StorageError, StorageResult};
pub use types::{FlowNodeRef, MeasurementPoint, MetricRecord, RecordedError};
