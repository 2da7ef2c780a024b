//! Protocol normalizers turning wire payloads into canonical [`Log`](crate::logs::Log) records
//!
//! - `otlp`: OTLP/HTTP log export requests (protobuf or JSON, optionally gzip)
//! - `syslog`: RFC5424 lines posted to the drain endpoint

pub mod otlp;
pub mod syslog;

pub use otlp::{decode_request, from_request, DecodeError, PayloadFormat};
pub use syslog::{parse_line, SyslogMessage, SyslogParseError};
