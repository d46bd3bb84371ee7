//! Line codec for metric files
//!
//! Every record is one `;`-separated line. The first column is a tag that
//! tells both the record scope and the layout version it was written with.
//! New lines are always written in the V2 layout; every layout that was ever
//! written can still be read.
//!
//! ```text
//! V2 process    ProcessModel_V2;ts;corr;pi;model;;;point;{};error
//! V2 flow node  FlowNodeInstance_V2;ts;corr;pi;model;fni;fn;point;payload;error
//! V1 process    ProcessModel;ts;corr;model;;;point[;{};error]
//! V1 flow node  FlowNodeInstance;ts;corr;model;fni;fn;point;payload[;error]
//! ```
//!
//! V2 always reserves the error column (empty when there is no error). V1
//! lines only carry an error when they have exactly 9 columns; shorter V1
//! lines are read without an error.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::storage::error::CodecError;
use crate::storage::error_codec;
use crate::storage::types::{
    empty_payload, FlowNodeRef, MeasurementPoint, MetricRecord, RecordedError,
};

/// Column separator
pub const SEPARATOR: char = ';';

/// Prefix of every process scoped tag
const PROCESS_PREFIX: &str = "ProcessModel";

/// Prefix of every flow node scoped tag
const FLOW_NODE_PREFIX: &str = "FlowNodeInstance";

/// Suffix marking the V2 layout
const V2_SUFFIX: &str = "_V2";

/// Number of columns in every V2 line
pub const V2_FIELD_COUNT: usize = 10;

/// The only V1 column count that includes an error column
const V1_FIELD_COUNT_WITH_ERROR: usize = 9;

/// Layout version of a metric line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// No process instance column, error column only when present
    V1,
    /// Process instance column and an always-present error column
    V2,
}

/// Scope and layout of a line, parsed once from its first column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    ProcessV1,
    ProcessV2,
    FlowNodeV1,
    FlowNodeV2,
}

impl LineTag {
    /// Classify the first column of a line
    ///
    /// Returns `None` for tags that belong to neither scope.
    pub fn parse(tag: &str) -> Option<Self> {
        let is_v2 = tag.ends_with(V2_SUFFIX);

        if tag.starts_with(FLOW_NODE_PREFIX) {
            Some(if is_v2 {
                LineTag::FlowNodeV2
            } else {
                LineTag::FlowNodeV1
            })
        } else if tag.starts_with(PROCESS_PREFIX) {
            Some(if is_v2 {
                LineTag::ProcessV2
            } else {
                LineTag::ProcessV1
            })
        } else {
            None
        }
    }

    /// Canonical tag text
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTag::ProcessV1 => "ProcessModel",
            LineTag::ProcessV2 => "ProcessModel_V2",
            LineTag::FlowNodeV1 => "FlowNodeInstance",
            LineTag::FlowNodeV2 => "FlowNodeInstance_V2",
        }
    }

    pub fn version(&self) -> SchemaVersion {
        match self {
            LineTag::ProcessV1 | LineTag::FlowNodeV1 => SchemaVersion::V1,
            LineTag::ProcessV2 | LineTag::FlowNodeV2 => SchemaVersion::V2,
        }
    }

    pub fn is_flow_node(&self) -> bool {
        matches!(self, LineTag::FlowNodeV1 | LineTag::FlowNodeV2)
    }
}

/// True for lines that carry no record at all
pub fn is_comment_or_blank(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

/// Encode a record as a V2 line (without the trailing line break)
pub fn encode(record: &MetricRecord) -> Result<String, CodecError> {
    let process_instance_id = record.process_instance_id.as_deref().unwrap_or("");

    check_field("correlation_id", &record.correlation_id)?;
    check_field("process_instance_id", process_instance_id)?;
    check_field("process_model_id", &record.process_model_id)?;

    let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    let error = record
        .error
        .as_ref()
        .map(error_codec::encode)
        .unwrap_or_default();

    let (tag, flow_node_instance_id, flow_node_id, payload) = match &record.flow_node {
        None => (LineTag::ProcessV2, "", "", "{}".to_string()),
        Some(flow_node) => {
            check_field("flow_node_instance_id", &flow_node.instance_id)?;
            check_field("flow_node_id", &flow_node.flow_node_id)?;

            let payload = serde_json::to_string(&record.payload)
                .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
            (
                LineTag::FlowNodeV2,
                flow_node.instance_id.as_str(),
                flow_node.flow_node_id.as_str(),
                payload,
            )
        }
    };

    Ok(join(&[
        tag.as_str(),
        timestamp.as_str(),
        record.correlation_id.as_str(),
        process_instance_id,
        record.process_model_id.as_str(),
        flow_node_instance_id,
        flow_node_id,
        record.measurement_point.as_str(),
        payload.as_str(),
        error.as_str(),
    ]))
}

fn join(fields: &[&str]) -> String {
    let mut line = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(SEPARATOR);
        }
        line.push_str(field);
    }
    line
}

fn check_field(field: &'static str, value: &str) -> Result<(), CodecError> {
    if value.contains(&[SEPARATOR, '\n', '\r'][..]) {
        return Err(CodecError::ReservedCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Decode one line of a metric file
///
/// `Ok(None)` means the line is a comment or blank. Every other line either
/// decodes to a record or yields the reason it could not be read.
pub fn decode(line: &str) -> Result<Option<MetricRecord>, CodecError> {
    if is_comment_or_blank(line) {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(SEPARATOR).collect();
    let tag = LineTag::parse(fields[0])
        .ok_or_else(|| CodecError::UnknownTag(fields[0].to_string()))?;
    let columns = Columns { tag, fields };

    let record = match tag {
        LineTag::ProcessV1 => decode_process_v1(&columns)?,
        LineTag::ProcessV2 => decode_process_v2(&columns)?,
        LineTag::FlowNodeV1 => decode_flow_node_v1(&columns)?,
        LineTag::FlowNodeV2 => decode_flow_node_v2(&columns)?,
    };

    Ok(Some(record))
}

/// Split columns of a line together with its tag, for error reporting
struct Columns<'a> {
    tag: LineTag,
    fields: Vec<&'a str>,
}

impl<'a> Columns<'a> {
    fn get(&self, index: usize, name: &'static str) -> Result<&'a str, CodecError> {
        self.fields
            .get(index)
            .copied()
            .ok_or(CodecError::MissingField {
                tag: self.tag.as_str(),
                index,
                name,
            })
    }

    fn len(&self) -> usize {
        self.fields.len()
    }

    fn timestamp(&self, index: usize) -> Result<DateTime<Utc>, CodecError> {
        let value = self.get(index, "timestamp")?;
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CodecError::InvalidTimestamp {
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    fn measurement_point(&self, index: usize) -> Result<MeasurementPoint, CodecError> {
        self.get(index, "measurement_point")?.parse()
    }

    /// V1 lines only carry an error when they have exactly 9 columns
    fn v1_error(&self) -> Option<RecordedError> {
        if self.len() == V1_FIELD_COUNT_WITH_ERROR {
            error_codec::decode(self.fields[V1_FIELD_COUNT_WITH_ERROR - 1])
        } else {
            None
        }
    }
}

fn parse_payload(raw: &str) -> Result<Value, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::InvalidPayload(e.to_string()))
}

fn decode_process_v1(columns: &Columns<'_>) -> Result<MetricRecord, CodecError> {
    Ok(MetricRecord {
        timestamp: columns.timestamp(1)?,
        correlation_id: columns.get(2, "correlation_id")?.to_string(),
        process_instance_id: None,
        process_model_id: columns.get(3, "process_model_id")?.to_string(),
        flow_node: None,
        measurement_point: columns.measurement_point(6)?,
        payload: empty_payload(),
        error: columns.v1_error(),
    })
}

fn decode_process_v2(columns: &Columns<'_>) -> Result<MetricRecord, CodecError> {
    Ok(MetricRecord {
        timestamp: columns.timestamp(1)?,
        correlation_id: columns.get(2, "correlation_id")?.to_string(),
        process_instance_id: Some(columns.get(3, "process_instance_id")?.to_string()),
        process_model_id: columns.get(4, "process_model_id")?.to_string(),
        flow_node: None,
        measurement_point: columns.measurement_point(7)?,
        payload: empty_payload(),
        error: error_codec::decode(columns.get(9, "error")?),
    })
}

fn decode_flow_node_v1(columns: &Columns<'_>) -> Result<MetricRecord, CodecError> {
    Ok(MetricRecord {
        timestamp: columns.timestamp(1)?,
        correlation_id: columns.get(2, "correlation_id")?.to_string(),
        process_instance_id: None,
        process_model_id: columns.get(3, "process_model_id")?.to_string(),
        flow_node: Some(FlowNodeRef {
            instance_id: columns.get(4, "flow_node_instance_id")?.to_string(),
            flow_node_id: columns.get(5, "flow_node_id")?.to_string(),
        }),
        measurement_point: columns.measurement_point(6)?,
        payload: parse_payload(columns.get(7, "payload")?)?,
        error: columns.v1_error(),
    })
}

fn decode_flow_node_v2(columns: &Columns<'_>) -> Result<MetricRecord, CodecError> {
    // The payload is raw JSON and may itself contain the separator. Error
    // tokens never do, so the error is always the last column and the
    // payload is everything between column 8 and it.
    let last = columns.len().max(V2_FIELD_COUNT) - 1;
    let error = columns.get(last, "error")?;
    let payload = columns.fields[8..last].join(&SEPARATOR.to_string());

    Ok(MetricRecord {
        timestamp: columns.timestamp(1)?,
        correlation_id: columns.get(2, "correlation_id")?.to_string(),
        process_instance_id: Some(columns.get(3, "process_instance_id")?.to_string()),
        process_model_id: columns.get(4, "process_model_id")?.to_string(),
        flow_node: Some(FlowNodeRef {
            instance_id: columns.get(5, "flow_node_instance_id")?.to_string(),
            flow_node_id: columns.get(6, "flow_node_id")?.to_string(),
        }),
        measurement_point: columns.measurement_point(7)?,
        payload: parse_payload(&payload)?,
        error: error_codec::decode(error),
    })
}
