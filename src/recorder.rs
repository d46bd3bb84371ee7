//! Lifecycle Recorder
//!
//! One method per lifecycle event of a process instance or flow node
//! instance. Each call builds the matching [`MetricRecord`] and hands it to
//! a [`MetricsRepository`] immediately; nothing is buffered.
//!
//! Identity and authorization checks happen before these methods are
//! called and are not part of this crate.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::storage::{
    FlowNodeRef, MeasurementPoint, MetricRecord, MetricsRepository, RecordedError, StorageResult,
};

/// Identifies the process instance an event belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRef {
    pub correlation_id: String,
    pub process_instance_id: String,
    pub process_model_id: String,
}

impl ProcessRef {
    pub fn new(
        correlation_id: impl Into<String>,
        process_instance_id: impl Into<String>,
        process_model_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            process_instance_id: process_instance_id.into(),
            process_model_id: process_model_id.into(),
        }
    }

    fn record(&self, point: MeasurementPoint, timestamp: DateTime<Utc>) -> MetricRecord {
        MetricRecord::process(
            timestamp,
            self.correlation_id.as_str(),
            self.process_instance_id.as_str(),
            self.process_model_id.as_str(),
            point,
        )
    }

    fn flow_node_record(
        &self,
        flow_node: &FlowNodeRef,
        point: MeasurementPoint,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> MetricRecord {
        MetricRecord::flow_node(
            timestamp,
            self.correlation_id.as_str(),
            self.process_instance_id.as_str(),
            self.process_model_id.as_str(),
            flow_node.instance_id.as_str(),
            flow_node.flow_node_id.as_str(),
            point,
            payload,
        )
    }
}

/// Records lifecycle events through a metrics repository
#[derive(Clone)]
pub struct MetricsRecorder {
    repository: Arc<dyn MetricsRepository>,
}

impl MetricsRecorder {
    pub fn new(repository: Arc<dyn MetricsRepository>) -> Self {
        Self { repository }
    }

    /// All metrics recorded for a process model
    pub async fn read_metrics(&self, process_model_id: &str) -> StorageResult<Vec<MetricRecord>> {
        self.repository.read_metrics(process_model_id).await
    }

    /// Archive all metrics of a process model
    pub async fn archive_metrics(&self, process_model_id: &str) -> StorageResult<()> {
        self.repository.archive_metrics(process_model_id).await
    }

    pub async fn on_process_started(
        &self,
        process: &ProcessRef,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = process.record(MeasurementPoint::ProcessStarted, timestamp);
        self.repository.write_metric(&record).await
    }

    pub async fn on_process_finished(
        &self,
        process: &ProcessRef,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = process.record(MeasurementPoint::ProcessFinished, timestamp);
        self.repository.write_metric(&record).await
    }

    /// Process instance was aborted with an error
    pub async fn on_process_error(
        &self,
        process: &ProcessRef,
        error: RecordedError,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = process
            .record(MeasurementPoint::ProcessErrored, timestamp)
            .with_error(error);
        self.repository.write_metric(&record).await
    }

    pub async fn on_flow_node_enter(
        &self,
        process: &ProcessRef,
        flow_node: &FlowNodeRef,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record =
            process.flow_node_record(flow_node, MeasurementPoint::FlowNodeEntered, payload, timestamp);
        self.repository.write_metric(&record).await
    }

    pub async fn on_flow_node_exit(
        &self,
        process: &ProcessRef,
        flow_node: &FlowNodeRef,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record =
            process.flow_node_record(flow_node, MeasurementPoint::FlowNodeExited, payload, timestamp);
        self.repository.write_metric(&record).await
    }

    /// Flow node instance was aborted with an error
    pub async fn on_flow_node_error(
        &self,
        process: &ProcessRef,
        flow_node: &FlowNodeRef,
        payload: Value,
        error: RecordedError,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = process
            .flow_node_record(flow_node, MeasurementPoint::FlowNodeErrored, payload, timestamp)
            .with_error(error);
        self.repository.write_metric(&record).await
    }

    pub async fn on_flow_node_suspend(
        &self,
        process: &ProcessRef,
        flow_node: &FlowNodeRef,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = process.flow_node_record(
            flow_node,
            MeasurementPoint::FlowNodeSuspended,
            payload,
            timestamp,
        );
        self.repository.write_metric(&record).await
    }

    pub async fn on_flow_node_resume(
        &self,
        process: &ProcessRef,
        flow_node: &FlowNodeRef,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record =
            process.flow_node_record(flow_node, MeasurementPoint::FlowNodeResumed, payload, timestamp);
        self.repository.write_metric(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MetricLogConfig, MetricLogEngine};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    /// Keeps records in memory, archive just clears them
    #[derive(Default)]
    struct MemoryRepository {
        records: Mutex<Vec<MetricRecord>>,
    }

    #[async_trait]
    impl MetricsRepository for MemoryRepository {
        async fn write_metric(&self, record: &MetricRecord) -> StorageResult<()> {
            self.records.lock().await.push(record.clone());
            Ok(())
        }

        async fn read_metrics(&self, process_model_id: &str) -> StorageResult<Vec<MetricRecord>> {
            Ok(self
                .records
                .lock()
                .await
                .iter()
                .filter(|r| r.process_model_id == process_model_id)
                .cloned()
                .collect())
        }

        async fn archive_metrics(&self, process_model_id: &str) -> StorageResult<()> {
            self.records
                .lock()
                .await
                .retain(|r| r.process_model_id != process_model_id);
            Ok(())
        }
    }

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, secs).unwrap()
    }

    fn process() -> ProcessRef {
        ProcessRef::new("corr-1", "pi-1", "Invoice")
    }

    fn task() -> FlowNodeRef {
        FlowNodeRef {
            instance_id: "fni-1".to_string(),
            flow_node_id: "Task_Approve".to_string(),
        }
    }

    async fn record_full_lifecycle(recorder: &MetricsRecorder) {
        let p = process();
        let t = task();
        recorder.on_process_started(&p, ts(0)).await.unwrap();
        recorder
            .on_flow_node_enter(&p, &t, json!({"n": 1}), ts(1))
            .await
            .unwrap();
        recorder
            .on_flow_node_suspend(&p, &t, json!({"n": 1}), ts(2))
            .await
            .unwrap();
        recorder
            .on_flow_node_resume(&p, &t, json!({"n": 2}), ts(3))
            .await
            .unwrap();
        recorder
            .on_flow_node_exit(&p, &t, json!({"n": 2}), ts(4))
            .await
            .unwrap();
        recorder.on_process_finished(&p, ts(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_measurement_points() {
        let recorder = MetricsRecorder::new(Arc::new(MemoryRepository::default()));
        record_full_lifecycle(&recorder).await;

        let points: Vec<_> = recorder
            .read_metrics("Invoice")
            .await
            .unwrap()
            .iter()
            .map(|r| r.measurement_point)
            .collect();

        assert_eq!(
            points,
            vec![
                MeasurementPoint::ProcessStarted,
                MeasurementPoint::FlowNodeEntered,
                MeasurementPoint::FlowNodeSuspended,
                MeasurementPoint::FlowNodeResumed,
                MeasurementPoint::FlowNodeExited,
                MeasurementPoint::ProcessFinished,
            ]
        );
    }

    #[tokio::test]
    async fn test_errors_are_attached() {
        let recorder = MetricsRecorder::new(Arc::new(MemoryRepository::default()));
        let p = process();

        recorder
            .on_flow_node_error(
                &p,
                &task(),
                json!({}),
                RecordedError::new("Error", "approval rejected"),
                ts(1),
            )
            .await
            .unwrap();
        recorder
            .on_process_error(&p, RecordedError::new("Error", "aborted"), ts(2))
            .await
            .unwrap();

        let records = recorder.read_metrics("Invoice").await.unwrap();
        assert_eq!(records[0].measurement_point, MeasurementPoint::FlowNodeErrored);
        assert_eq!(records[0].flow_node_id(), Some("Task_Approve"));
        assert_eq!(records[0].error.as_ref().unwrap().message, "approval rejected");
        assert_eq!(records[1].measurement_point, MeasurementPoint::ProcessErrored);
        assert!(records[1].flow_node.is_none());
        assert!(records[1].error.is_some());
    }

    #[tokio::test]
    async fn test_recorder_with_file_engine() {
        let dir = tempdir().unwrap();
        let engine = MetricLogEngine::new(MetricLogConfig::new(dir.path()));
        let recorder = MetricsRecorder::new(Arc::new(engine));

        record_full_lifecycle(&recorder).await;

        let records = recorder.read_metrics("Invoice").await.unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].timestamp, ts(0));
        assert_eq!(records[3].payload, json!({"n": 2}));
        assert!(records
            .iter()
            .all(|r| r.process_instance_id.as_deref() == Some("pi-1")));

        recorder.archive_metrics("Invoice").await.unwrap();
        assert!(recorder.read_metrics("Invoice").await.unwrap().is_empty());
    }
}
