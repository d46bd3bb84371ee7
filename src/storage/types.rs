//! Core data types for the metric log
//!
//! This module defines the values that flow through the engine:
//! - `MetricRecord`: one lifecycle event of a process or flow node
//! - `MeasurementPoint`: the closed set of lifecycle event kinds
//! - `FlowNodeRef`: identifiers of the flow node a record belongs to
//! - `RecordedError`: an application error captured as data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::storage::error::CodecError;

/// Kind of lifecycle event being measured
///
/// Stored on disk by its symbolic name, never by position, so reordering
/// the variants does not change the file format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MeasurementPoint {
    #[serde(rename = "onProcessStart")]
    ProcessStarted,
    #[serde(rename = "onProcessFinish")]
    ProcessFinished,
    #[serde(rename = "onProcessError")]
    ProcessErrored,
    #[serde(rename = "onFlowNodeEnter")]
    FlowNodeEntered,
    #[serde(rename = "onFlowNodeExit")]
    FlowNodeExited,
    #[serde(rename = "onFlowNodeError")]
    FlowNodeErrored,
    #[serde(rename = "onFlowNodeSuspend")]
    FlowNodeSuspended,
    #[serde(rename = "onFlowNodeResume")]
    FlowNodeResumed,
}

impl MeasurementPoint {
    /// All measurement points, process kinds first
    pub fn all() -> &'static [MeasurementPoint] {
        &[
            MeasurementPoint::ProcessStarted,
            MeasurementPoint::ProcessFinished,
            MeasurementPoint::ProcessErrored,
            MeasurementPoint::FlowNodeEntered,
            MeasurementPoint::FlowNodeExited,
            MeasurementPoint::FlowNodeErrored,
            MeasurementPoint::FlowNodeSuspended,
            MeasurementPoint::FlowNodeResumed,
        ]
    }

    /// Name written to the metric file
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementPoint::ProcessStarted => "onProcessStart",
            MeasurementPoint::ProcessFinished => "onProcessFinish",
            MeasurementPoint::ProcessErrored => "onProcessError",
            MeasurementPoint::FlowNodeEntered => "onFlowNodeEnter",
            MeasurementPoint::FlowNodeExited => "onFlowNodeExit",
            MeasurementPoint::FlowNodeErrored => "onFlowNodeError",
            MeasurementPoint::FlowNodeSuspended => "onFlowNodeSuspend",
            MeasurementPoint::FlowNodeResumed => "onFlowNodeResume",
        }
    }

    /// True for the two kinds that carry an error
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MeasurementPoint::ProcessErrored | MeasurementPoint::FlowNodeErrored
        )
    }

    /// True for kinds recorded against a flow node instance
    pub fn is_flow_node(&self) -> bool {
        !matches!(
            self,
            MeasurementPoint::ProcessStarted
                | MeasurementPoint::ProcessFinished
                | MeasurementPoint::ProcessErrored
        )
    }
}

impl std::fmt::Display for MeasurementPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementPoint {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementPoint::all()
            .iter()
            .copied()
            .find(|point| point.as_str() == s)
            .ok_or_else(|| CodecError::UnknownMeasurementPoint(s.to_string()))
    }
}

/// An application error captured at the moment of measurement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    /// Error kind, e.g. "TypeError" or "NotFoundError"
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Optional numeric code (HTTP-style status for service errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<Value>,
}

impl RecordedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
            additional_information: None,
        }
    }

    /// Builder method: set the error code
    pub fn code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Builder method: attach structured details
    pub fn additional_information(mut self, info: Value) -> Self {
        self.additional_information = Some(info);
        self
    }
}

impl std::fmt::Display for RecordedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RecordedError {}

/// Identifiers of the flow node a record was measured on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeRef {
    /// Runtime occurrence of the flow node
    pub instance_id: String,
    /// Flow node id within the process model
    pub flow_node_id: String,
}

/// One recorded lifecycle event
///
/// Whether a record is process scoped or flow node scoped is fixed by the
/// constructor used; `flow_node` is never set afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    /// When the event happened (not when it was written)
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    /// Absent on lines written before the V2 layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_instance_id: Option<String>,
    /// Partition key: one metric file per process model
    pub process_model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_node: Option<FlowNodeRef>,
    pub measurement_point: MeasurementPoint,
    /// Opaque token payload; `{}` for process scoped records
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
}

impl MetricRecord {
    /// Create a process scoped record
    pub fn process(
        timestamp: DateTime<Utc>,
        correlation_id: impl Into<String>,
        process_instance_id: impl Into<String>,
        process_model_id: impl Into<String>,
        measurement_point: MeasurementPoint,
    ) -> Self {
        Self {
            timestamp,
            correlation_id: correlation_id.into(),
            process_instance_id: Some(process_instance_id.into()),
            process_model_id: process_model_id.into(),
            flow_node: None,
            measurement_point,
            payload: empty_payload(),
            error: None,
        }
    }

    /// Create a flow node scoped record
    #[allow(clippy::too_many_arguments)]
    pub fn flow_node(
        timestamp: DateTime<Utc>,
        correlation_id: impl Into<String>,
        process_instance_id: impl Into<String>,
        process_model_id: impl Into<String>,
        flow_node_instance_id: impl Into<String>,
        flow_node_id: impl Into<String>,
        measurement_point: MeasurementPoint,
        payload: Value,
    ) -> Self {
        Self {
            timestamp,
            correlation_id: correlation_id.into(),
            process_instance_id: Some(process_instance_id.into()),
            process_model_id: process_model_id.into(),
            flow_node: Some(FlowNodeRef {
                instance_id: flow_node_instance_id.into(),
                flow_node_id: flow_node_id.into(),
            }),
            measurement_point,
            payload,
            error: None,
        }
    }

    /// Builder method: attach the error that was encountered
    pub fn with_error(mut self, error: RecordedError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_flow_node(&self) -> bool {
        self.flow_node.is_some()
    }

    pub fn flow_node_instance_id(&self) -> Option<&str> {
        self.flow_node.as_ref().map(|f| f.instance_id.as_str())
    }

    pub fn flow_node_id(&self) -> Option<&str> {
        self.flow_node.as_ref().map(|f| f.flow_node_id.as_str())
    }
}

/// The `{}` placeholder used for process scoped payloads
pub fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}
