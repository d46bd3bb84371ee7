//! Metric log engine
//!
//! Orchestrates the codec and the file system adapter:
//! - Write path: MetricRecord → encode (V2) → append to `<model>.met`
//! - Read path: `<model>.met` → lines → decode (any version) → records
//! - Archive path: `<model>.met` → `<archive>/<model>-<timestamp>.met`
//!
//! The engine keeps no state besides its configuration. There is no
//! in-process locking; callers that need a particular interleaving of
//! appends to the same model serialize them themselves.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::storage::adapter;
use crate::storage::codec;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::MetricRecord;

/// Extension of every metric file
pub const METRIC_FILE_EXTENSION: &str = "met";

/// Archive directory name used when none is configured
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Configuration for the metric log engine
#[derive(Debug, Clone)]
pub struct MetricLogConfig {
    /// Directory holding one metric file per process model
    pub output_dir: PathBuf,
    /// Where archived files go (default: `<output_dir>/archive`)
    pub archive_dir: Option<PathBuf>,
}

impl Default for MetricLogConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("metrics"),
            archive_dir: None,
        }
    }
}

impl MetricLogConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            archive_dir: None,
        }
    }

    /// Builder method: archive into an explicit directory
    pub fn archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(archive_dir.into());
        self
    }

    /// Directory archived files are moved into
    pub fn resolved_archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_ARCHIVE_DIR))
    }

    /// Path of the metric file for a process model
    pub fn model_path(&self, process_model_id: &str) -> StorageResult<PathBuf> {
        validate_model_id(process_model_id)?;
        Ok(self
            .output_dir
            .join(format!("{}.{}", process_model_id, METRIC_FILE_EXTENSION)))
    }
}

/// The model id becomes a file name, so it must not escape the output
/// directory or break the line format.
fn validate_model_id(process_model_id: &str) -> StorageResult<()> {
    let invalid = process_model_id.is_empty()
        || process_model_id == "."
        || process_model_id == ".."
        || process_model_id.contains(&['/', '\\', ';', '\n', '\r', '\0'][..]);

    if invalid {
        return Err(StorageError::InvalidModelId(process_model_id.to_string()));
    }
    Ok(())
}

/// Storage backend for lifecycle metrics
///
/// Implemented by [`MetricLogEngine`]; the recorder only talks to this
/// trait so other backends can be plugged in.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Persist one record
    async fn write_metric(&self, record: &MetricRecord) -> StorageResult<()>;

    /// All readable records of a process model, in write order
    async fn read_metrics(&self, process_model_id: &str) -> StorageResult<Vec<MetricRecord>>;

    /// Move all records of a process model out of the live log
    async fn archive_metrics(&self, process_model_id: &str) -> StorageResult<()>;
}

/// File backed, append-only metric log
#[derive(Debug, Clone)]
pub struct MetricLogEngine {
    config: MetricLogConfig,
}

impl MetricLogEngine {
    pub fn new(config: MetricLogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricLogConfig {
        &self.config
    }

    /// Get the output directory path
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Append a record to its model's file, creating the file on first use
    pub async fn append(&self, record: &MetricRecord) -> StorageResult<()> {
        let path = self.config.model_path(&record.process_model_id)?;

        if record.error.is_some() != record.measurement_point.is_error() {
            tracing::debug!(
                "Record {} for {} has error={}, which does not match its measurement point",
                record.measurement_point,
                record.process_model_id,
                record.error.is_some()
            );
        }

        let line = codec::encode(record)?;

        if let Some(parent) = path.parent() {
            adapter::ensure_directory(parent).await?;
        }
        adapter::append_line(&path, &line).await?;

        tracing::debug!(
            "Appended {} for {} to {:?}",
            record.measurement_point,
            record.process_model_id,
            path
        );
        Ok(())
    }

    /// Read every decodable record of a process model in file order
    ///
    /// A model without a file has no metrics yet and yields an empty list.
    pub async fn read_all(&self, process_model_id: &str) -> StorageResult<Vec<MetricRecord>> {
        let path = self.config.model_path(process_model_id)?;

        if !adapter::target_exists(&path).await? {
            return Ok(Vec::new());
        }

        let lines = adapter::read_lines(&path).await?;
        Ok(decode_lines(&lines, &path))
    }

    /// Archive a model's file; returns where it was moved to
    ///
    /// No-op (returns `None`) when the model has no metric file. Reading the
    /// model afterwards returns nothing until new records are appended.
    pub async fn archive(&self, process_model_id: &str) -> StorageResult<Option<PathBuf>> {
        let path = self.config.model_path(process_model_id)?;

        if !adapter::target_exists(&path).await? {
            tracing::debug!("No metrics to archive for {}", process_model_id);
            return Ok(None);
        }

        let archive_dir = self.config.resolved_archive_dir();
        let moved = adapter::move_to_archive(&archive_dir, &path, Utc::now()).await?;

        if let Some(ref destination) = moved {
            tracing::info!("Archived metrics of {} to {:?}", process_model_id, destination);
        }
        Ok(moved)
    }

    /// Read the records of every metric file in the output directory
    ///
    /// Files are read in name order. Other files and the archive
    /// subdirectory are not included.
    pub async fn read_all_models(&self) -> StorageResult<Vec<MetricRecord>> {
        let output_dir = &self.config.output_dir;

        if !adapter::target_exists(output_dir).await? {
            return Ok(Vec::new());
        }

        let lines =
            adapter::read_directory_lines(output_dir, Some(METRIC_FILE_EXTENSION)).await?;
        Ok(decode_lines(&lines, output_dir))
    }

    /// Ids of all process models that currently have a metric file
    pub async fn list_models(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .model_files()
            .await?
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect())
    }

    async fn model_files(&self) -> StorageResult<Vec<PathBuf>> {
        if !adapter::target_exists(&self.config.output_dir).await? {
            return Ok(Vec::new());
        }
        adapter::list_files(&self.config.output_dir, Some(METRIC_FILE_EXTENSION)).await
    }
}

/// Decode raw lines, dropping the ones that cannot be read
fn decode_lines(lines: &[String], source: &Path) -> Vec<MetricRecord> {
    let mut records = Vec::with_capacity(lines.len());
    let mut dropped = 0usize;

    for (index, line) in lines.iter().enumerate() {
        match codec::decode(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                dropped += 1;
                tracing::warn!("Skipping line {} of {:?}: {}", index + 1, source, e);
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(
            "Read {} records from {:?}, skipped {}",
            records.len(),
            source,
            dropped
        );
    }

    records
}

#[async_trait]
impl MetricsRepository for MetricLogEngine {
    async fn write_metric(&self, record: &MetricRecord) -> StorageResult<()> {
        self.append(record).await
    }

    async fn read_metrics(&self, process_model_id: &str) -> StorageResult<Vec<MetricRecord>> {
        self.read_all(process_model_id).await
    }

    async fn archive_metrics(&self, process_model_id: &str) -> StorageResult<()> {
        self.archive(process_model_id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{MeasurementPoint, RecordedError};
    use chrono::{DateTime, Duration, TimeZone};
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_engine() -> (MetricLogEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = MetricLogEngine::new(MetricLogConfig::new(dir.path().join("metrics")));
        (engine, dir)
    }

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn enter(model: &str, node: &str, offset: i64) -> MetricRecord {
        MetricRecord::flow_node(
            ts(offset),
            "corr-1",
            "pi-1",
            model,
            format!("fni-{}", node),
            node,
            MeasurementPoint::FlowNodeEntered,
            json!({"step": node}),
        )
    }

    #[tokio::test]
    async fn test_append_creates_model_file() {
        let (engine, _dir) = create_test_engine();
        let record = MetricRecord::process(
            ts(0),
            "corr-1",
            "pi-1",
            "Invoice",
            MeasurementPoint::ProcessStarted,
        );

        engine.append(&record).await.unwrap();

        let path = engine.output_dir().join("Invoice.met");
        assert!(path.exists());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("ProcessModel_V2;"));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_append_then_read_preserves_order() {
        let (engine, _dir) = create_test_engine();
        let records = vec![enter("M", "A", 0), enter("M", "B", 1), enter("M", "C", 2)];

        for record in &records {
            engine.append(record).await.unwrap();
        }

        let read = engine.read_all("M").await.unwrap();
        assert_eq!(read, records);
    }

    #[tokio::test]
    async fn test_models_are_partitioned() {
        let (engine, _dir) = create_test_engine();
        engine.append(&enter("A", "x", 0)).await.unwrap();
        engine.append(&enter("B", "y", 1)).await.unwrap();
        engine.append(&enter("A", "z", 2)).await.unwrap();

        assert_eq!(engine.read_all("A").await.unwrap().len(), 2);
        assert_eq!(engine.read_all("B").await.unwrap().len(), 1);
        assert_eq!(engine.list_models().await.unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_read_missing_model_is_empty() {
        let (engine, _dir) = create_test_engine();
        let records = engine.read_all("Nothing").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_archive_missing_model_is_noop() {
        let (engine, _dir) = create_test_engine();
        let moved = engine.archive("Nothing").await.unwrap();
        assert!(moved.is_none());
        assert!(!engine.config().resolved_archive_dir().exists());
    }

    #[tokio::test]
    async fn test_comment_and_blank_lines_are_ignored() {
        let (engine, _dir) = create_test_engine();
        let line = codec::encode(&enter("M", "A", 0)).unwrap();

        std::fs::create_dir_all(engine.output_dir()).unwrap();
        std::fs::write(
            engine.output_dir().join("M.met"),
            format!("# comment\n\n{}\n", line),
        )
        .unwrap();

        let records = engine.read_all("M").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].flow_node_id(), Some("A"));
    }

    #[tokio::test]
    async fn test_unrecognized_lines_are_skipped() {
        let (engine, _dir) = create_test_engine();
        engine.append(&enter("M", "A", 0)).await.unwrap();

        let path = engine.output_dir().join("M.met");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("SomethingElse;2024-03-01T12:00:00.000Z;corr;M\n");
        content.push_str("ProcessModel_V2;2024-03-01T12:00:00.000Z;c;p;M;;;onProcessNap;{};\n");
        std::fs::write(&path, content).unwrap();

        engine.append(&enter("M", "B", 1)).await.unwrap();

        let records = engine.read_all("M").await.unwrap();
        let nodes: Vec<_> = records.iter().filter_map(|r| r.flow_node_id()).collect();
        assert_eq!(nodes, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_mixed_schema_versions() {
        let (engine, _dir) = create_test_engine();
        std::fs::create_dir_all(engine.output_dir()).unwrap();
        std::fs::write(
            engine.output_dir().join("Legacy.met"),
            "ProcessModel;2019-05-03T09:12:00.000Z;corr-1;Legacy;;;onProcessStart\n\
             FlowNodeInstance;2019-05-03T09:12:01.000Z;corr-1;Legacy;fni;Task;onFlowNodeEnter;{}\n",
        )
        .unwrap();

        engine
            .append(&MetricRecord::process(
                ts(0),
                "corr-2",
                "pi-2",
                "Legacy",
                MeasurementPoint::ProcessFinished,
            ))
            .await
            .unwrap();

        let records = engine.read_all("Legacy").await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].process_instance_id.is_none());
        assert!(records[1].process_instance_id.is_none());
        assert_eq!(records[2].process_instance_id.as_deref(), Some("pi-2"));
    }

    #[tokio::test]
    async fn test_archive_moves_file() {
        let (engine, _dir) = create_test_engine();
        engine.append(&enter("M", "A", 0)).await.unwrap();
        engine
            .append(
                &MetricRecord::process(ts(1), "c", "p", "M", MeasurementPoint::ProcessErrored)
                    .with_error(RecordedError::new("Error", "failed")),
            )
            .await
            .unwrap();

        let original = engine.output_dir().join("M.met");
        let content = std::fs::read_to_string(&original).unwrap();

        let moved = engine.archive("M").await.unwrap().unwrap();

        assert!(!original.exists());
        assert_eq!(moved.parent().unwrap(), engine.output_dir().join("archive"));
        let name = moved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("M-"));
        assert!(name.ends_with(".met"));
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), content);
        assert_eq!(content.lines().count(), 2);

        assert!(engine.read_all("M").await.unwrap().is_empty());

        // A fresh file is started on the next append
        engine.append(&enter("M", "B", 2)).await.unwrap();
        assert_eq!(engine.read_all("M").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_to_configured_directory() {
        let dir = tempdir().unwrap();
        let config = MetricLogConfig::new(dir.path().join("out"))
            .archive_dir(dir.path().join("elsewhere"));
        let engine = MetricLogEngine::new(config);

        engine.append(&enter("M", "A", 0)).await.unwrap();
        let moved = engine.archive("M").await.unwrap().unwrap();

        assert_eq!(moved.parent().unwrap(), dir.path().join("elsewhere"));
    }

    #[tokio::test]
    async fn test_read_all_models_skips_archive() {
        let (engine, _dir) = create_test_engine();
        engine.append(&enter("A", "a", 0)).await.unwrap();
        engine.append(&enter("B", "b", 1)).await.unwrap();
        engine.archive("B").await.unwrap();
        engine.append(&enter("C", "c", 2)).await.unwrap();
        std::fs::write(engine.output_dir().join(".DS_Store"), b"\x00\x01\xff\xfe").unwrap();
        std::fs::write(engine.output_dir().join("notes.txt"), "not a metric line\n").unwrap();

        let records = engine.read_all_models().await.unwrap();
        let models: Vec<_> = records.iter().map(|r| r.process_model_id.as_str()).collect();
        assert_eq!(models, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_read_all_models_without_output_dir() {
        let (engine, _dir) = create_test_engine();
        assert!(engine.read_all_models().await.unwrap().is_empty());
        assert!(engine.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_model_ids_are_rejected() {
        let (engine, _dir) = create_test_engine();

        for id in ["", "..", "../escape", "a/b", "a;b"] {
            let record = enter(id, "A", 0);
            let err = engine.append(&record).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidModelId(_)), "{}", id);
        }
    }

    #[tokio::test]
    async fn test_reserved_characters_are_not_written() {
        let (engine, _dir) = create_test_engine();
        let record = MetricRecord::process(
            ts(0),
            "corr\n2",
            "p",
            "M",
            MeasurementPoint::ProcessStarted,
        );

        let err = engine.append(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::Codec(_)));
        assert!(!engine.output_dir().join("M.met").exists());
    }

    #[tokio::test]
    async fn test_storage_faults_propagate() {
        let dir = tempdir().unwrap();
        // Output "directory" is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let engine = MetricLogEngine::new(MetricLogConfig::new(&blocker));

        let err = engine.append(&enter("M", "A", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let err = engine.read_all("M").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let err = engine.archive("M").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let err = engine.read_all_models().await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_drops_only_that_line() {
        let (engine, _dir) = create_test_engine();
        engine.append(&enter("M", "A", 0)).await.unwrap();

        let path = engine.output_dir().join("M.met");
        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"garbage\xff\xfe line\n");
        std::fs::write(&path, content).unwrap();

        engine.append(&enter("M", "B", 1)).await.unwrap();

        let records = engine.read_all("M").await.unwrap();
        let nodes: Vec<_> = records.iter().filter_map(|r| r.flow_node_id()).collect();
        assert_eq!(nodes, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_repository_trait() {
        let (engine, _dir) = create_test_engine();
        let repository: &dyn MetricsRepository = &engine;

        repository.write_metric(&enter("M", "A", 0)).await.unwrap();
        assert_eq!(repository.read_metrics("M").await.unwrap().len(), 1);

        repository.archive_metrics("M").await.unwrap();
        assert!(repository.read_metrics("M").await.unwrap().is_empty());
    }
}
