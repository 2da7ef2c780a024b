//! OTLP/HTTP log payload decoding and normalization
//!
//! Payloads arrive as binary protobuf (`application/x-protobuf`) or OTLP/JSON,
//! optionally gzip-compressed, and decode into an `ExportLogsServiceRequest`.

use crate::logs::{AttributeValue, Attributes, Log};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use prost::Message;
use serde::Deserialize;
use std::fmt::Write as _;
use std::io::Read;
use thiserror::Error;

/// Resource attribute promoted to `Log::service_name`
pub const SERVICE_NAME_KEY: &str = "service.name";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid gzip payload: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("Invalid protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decompressed payload exceeds {0} bytes")]
    TooLarge(usize),
}

/// OTLP/JSON request; proto3 JSON may omit the empty `resourceLogs` list
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRequest {
    #[serde(default)]
    resource_logs: Vec<ResourceLogs>,
}

/// Wire encoding of an OTLP request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Protobuf,
    Json,
}

impl PayloadFormat {
    /// Binary protobuf for the protobuf media types, JSON for anything else
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());
        match media_type.as_deref() {
            Some("application/x-protobuf") | Some("application/protobuf") => Self::Protobuf,
            _ => Self::Json,
        }
    }
}

/// Decode a request body, decompressing first when `gzip` is set
///
/// Inflated payloads larger than `max_inflated` bytes are rejected.
pub fn decode_request(
    body: &[u8],
    format: PayloadFormat,
    gzip: bool,
    max_inflated: usize,
) -> Result<ExportLogsServiceRequest, DecodeError> {
    let inflated;
    let bytes = if gzip {
        inflated = inflate(body, max_inflated)?;
        inflated.as_slice()
    } else {
        body
    };

    let request = match format {
        PayloadFormat::Protobuf => ExportLogsServiceRequest::decode(bytes)?,
        PayloadFormat::Json => {
            let request: JsonRequest = serde_json::from_slice(bytes)?;
            ExportLogsServiceRequest {
                resource_logs: request.resource_logs,
            }
        }
    };
    Ok(request)
}

fn inflate(body: &[u8], max_inflated: usize) -> Result<Vec<u8>, DecodeError> {
    let limit = u64::try_from(max_inflated).unwrap_or(u64::MAX);
    let mut buf = Vec::new();
    GzDecoder::new(body)
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(DecodeError::Gzip)?;
    if buf.len() > max_inflated {
        return Err(DecodeError::TooLarge(max_inflated));
    }
    Ok(buf)
}

/// Flatten resource → scope → record into canonical logs, preserving record order
///
/// Records without an observed time use `received_at`; records without an
/// event time use their observed time.
pub fn from_request(request: &ExportLogsServiceRequest, received_at: DateTime<Utc>) -> Vec<Log> {
    let mut logs = Vec::new();

    for resource_logs in &request.resource_logs {
        let mut resource_attributes = resource_logs
            .resource
            .as_ref()
            .map(|resource| to_attributes(&resource.attributes))
            .unwrap_or_default();
        let service_name = resource_attributes
            .remove(SERVICE_NAME_KEY)
            .map(|value| value.to_string());

        for scope_logs in &resource_logs.scope_logs {
            let scope_name = scope_logs
                .scope
                .as_ref()
                .map(|scope| scope.name.clone())
                .filter(|name| !name.is_empty());
            let scope_attributes = scope_logs
                .scope
                .as_ref()
                .map(|scope| to_attributes(&scope.attributes))
                .unwrap_or_default();

            for record in &scope_logs.log_records {
                let observed_timestamp =
                    from_unix_nanos(record.observed_time_unix_nano).unwrap_or(received_at);
                let timestamp =
                    from_unix_nanos(record.time_unix_nano).unwrap_or(observed_timestamp);

                let mut attributes = scope_attributes.clone();
                attributes.extend(to_attributes(&record.attributes));

                logs.push(Log {
                    log_id: None,
                    timestamp,
                    observed_timestamp,
                    severity_text: Some(record.severity_text.clone()).filter(|s| !s.is_empty()),
                    severity_number: record.severity_number,
                    service_name: service_name.clone(),
                    scope: scope_name.clone(),
                    body: to_attribute_value(record.body.as_ref()).to_string(),
                    trace_id: to_hex(&record.trace_id),
                    span_id: to_hex(&record.span_id),
                    trace_flags: (record.flags & 0xff) as i32,
                    attributes,
                    resource_attributes: resource_attributes.clone(),
                });
            }
        }
    }

    logs
}

fn from_unix_nanos(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos == 0 {
        return None;
    }
    i64::try_from(nanos).ok().map(DateTime::from_timestamp_nanos)
}

fn to_attributes(key_values: &[KeyValue]) -> Attributes {
    key_values
        .iter()
        .map(|kv| (kv.key.clone(), to_attribute_value(kv.value.as_ref())))
        .collect()
}

fn to_attribute_value(value: Option<&AnyValue>) -> AttributeValue {
    match value.and_then(|v| v.value.as_ref()) {
        Some(Value::StringValue(s)) => AttributeValue::String(s.clone()),
        Some(Value::BoolValue(b)) => AttributeValue::Bool(*b),
        Some(Value::IntValue(i)) => AttributeValue::Int(*i),
        Some(Value::DoubleValue(d)) => AttributeValue::Double(*d),
        Some(Value::BytesValue(bytes)) => AttributeValue::Bytes(bytes.clone()),
        Some(Value::ArrayValue(array)) => AttributeValue::Array(
            array
                .values
                .iter()
                .map(|v| to_attribute_value(Some(v)))
                .collect(),
        ),
        Some(Value::KvlistValue(list)) => AttributeValue::Map(to_attributes(&list.values)),
        None => AttributeValue::default(),
    }
}

fn to_hex(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{:02x}", b);
    }
    Some(hex)
}
