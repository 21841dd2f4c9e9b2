// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Error translation at the transport boundary
//!
//! [`to_wire_status`] turns whatever error a handler produced into a
//! [`Status`]. When the error carries details they are serialized, together
//! with the code and message, into a status envelope (wire compatible with
//! `google.rpc.Status`) marshalled with the codec of the call encoding. The
//! envelope travels as the out-of-band details blob of the status.
//! [`from_wire_status`] is the inverse used on the calling side.

use std::error::Error as StdError;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::code::{GrpcCode, InvalidGrpcCode};
use crate::codec::{CodecError, CodecRegistry};
use crate::error::{Detail, RpcError};
use crate::status::Status;
use crate::transport::{ApplicationErrorMeta, ResponseWriter};

/// Serialized status: code in the gRPC space, message and typed details
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusEnvelope {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<DetailEnvelope>,
}

impl prost::Name for StatusEnvelope {
    const NAME: &'static str = "Status";
    const PACKAGE: &'static str = "google.rpc";
}

/// One detail entry: type identifier plus the detail encoded with the call
/// encoding
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailEnvelope {
    #[prost(string, tag = "1")]
    #[serde(rename = "@type")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

impl prost::Name for DetailEnvelope {
    const NAME: &'static str = "Any";
    const PACKAGE: &'static str = "google.protobuf";
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn application_error_meta(err: &RpcError) -> ApplicationErrorMeta {
    ApplicationErrorMeta {
        code: Some(err.code()),
        name: err.details().first().map(Detail::name).unwrap_or_default(),
        details: err
            .details()
            .iter()
            .map(Detail::render)
            .collect::<Vec<_>>()
            .join(" , "),
    }
}

fn encode_detail(
    registry: &CodecRegistry,
    encoding: &str,
    detail: &Detail,
) -> Result<DetailEnvelope, CodecError> {
    match detail {
        Detail::Message(message) => {
            let buf = registry.marshal(encoding, message.as_ref())?;
            Ok(DetailEnvelope {
                type_url: message.type_url(),
                value: buf.to_vec(),
            })
        }
        // forwarded as received
        Detail::Undecodable(undecodable) => Ok(DetailEnvelope {
            type_url: undecodable.type_url.clone(),
            value: undecodable.value.to_vec(),
        }),
    }
}

fn encode_envelope(
    registry: &CodecRegistry,
    encoding: &str,
    err: &RpcError,
) -> Result<Bytes, CodecError> {
    let details = err
        .details()
        .iter()
        .map(|detail| encode_detail(registry, encoding, detail))
        .collect::<Result<Vec<_>, _>>()?;

    let envelope = StatusEnvelope {
        code: err.code().to_grpc().into(),
        message: err.message().to_string(),
        details,
    };
    let buf = registry.marshal(encoding, &envelope)?;
    Ok(Bytes::copy_from_slice(buf.as_slice()))
}

/// Translate a handler error into a wire status.
///
/// A [`Status`] found at the top of the chain is returned untouched. Otherwise
/// the first [`RpcError`] of the chain supplies code, message and details,
/// falling back to `Unknown` with the error text. When `writer` is given it
/// receives the application error metadata.
pub fn to_wire_status(
    registry: &CodecRegistry,
    encoding: &str,
    err: &(dyn StdError + 'static),
    writer: Option<&mut dyn ResponseWriter>,
) -> Status {
    if let Some(status) = err.downcast_ref::<Status>() {
        return status.clone();
    }

    let rpc = RpcError::from_error(err);
    if let Some(writer) = writer {
        writer.set_application_error_meta(application_error_meta(&rpc));
    }

    let status = Status::new(rpc.code(), rpc.message());
    if rpc.details().is_empty() {
        return status;
    }

    match encode_envelope(registry, encoding, &rpc) {
        Ok(envelope) => status.with_details(envelope),
        Err(err @ CodecError::UnrecognizedEncoding(_)) => Status::internal(err.to_string()),
        Err(err) => {
            tracing::warn!(%encoding, error = %err, "failed to serialize error details");
            Status::internal(format!("failed to serialize error details: {err}"))
        }
    }
}

/// Rebuild the typed error carried by a wire status.
///
/// Details are decoded one by one; an entry that cannot be decoded becomes
/// [`Detail::Undecodable`] without affecting the others.
pub fn from_wire_status(registry: &CodecRegistry, encoding: &str, status: &Status) -> RpcError {
    let Some(blob) = status.details() else {
        return RpcError::new(status.code(), status.message())
            .unwrap_or_else(|| RpcError::unknown(status.message()));
    };

    let mut envelope = StatusEnvelope::default();
    if let Err(err) = registry.unmarshal(encoding, blob, &mut envelope) {
        return match err {
            CodecError::UnrecognizedEncoding(_) => RpcError::internal(err.to_string()),
            err => RpcError::internal(format!("malformed status envelope: {err}")),
        };
    }

    let code = match GrpcCode::try_from(envelope.code) {
        Ok(code) => code.to_code(),
        Err(err) => return RpcError::internal(err.to_string()),
    };

    // an envelope is only produced for errors
    let Some(err) = RpcError::new(code, envelope.message) else {
        return RpcError::internal(InvalidGrpcCode(envelope.code).to_string());
    };

    let details = envelope.details.into_iter().map(|detail| {
        registry.decode_detail(encoding, &detail.type_url, Bytes::from(detail.value))
    });
    err.with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;
    use crate::codec::{JSON_ENCODING, PROTO_ENCODING, RAW_ENCODING};
    use crate::error::new_error;
    use crate::message::Message;
    use crate::testutil::{Echo, FieldViolation, RetryInfo};
    use crate::transport::ResponseRecorder;

    fn registry() -> CodecRegistry {
        let mut registry = CodecRegistry::with_defaults();
        registry.register_detail::<FieldViolation>();
        registry.register_detail::<RetryInfo>();
        registry
    }

    fn violation() -> FieldViolation {
        FieldViolation {
            field: "name".to_string(),
            description: "must not be empty".to_string(),
        }
    }

    #[test]
    fn test_round_trip_with_details() {
        let registry = registry();
        for encoding in [PROTO_ENCODING, JSON_ENCODING] {
            let err = new_error(
                Code::InvalidArgument,
                "bad field",
                vec![
                    Detail::new(violation()),
                    Detail::new(RetryInfo { retry_after_ms: 250 }),
                ],
            )
            .unwrap();

            let status = to_wire_status(&registry, encoding, &err, None);
            assert_eq!(status.code(), Code::InvalidArgument);
            assert_eq!(status.message(), "bad field");
            assert!(status.details().is_some());

            let decoded = from_wire_status(&registry, encoding, &status);
            assert_eq!(decoded, err, "encoding {encoding}");
        }
    }

    #[test]
    fn test_round_trip_every_code() {
        let registry = registry();
        for code in Code::all().filter(Code::is_err) {
            let err = new_error(code, "msg", vec![Detail::new(violation())]).unwrap();
            let status = to_wire_status(&registry, PROTO_ENCODING, &err, None);
            assert_eq!(from_wire_status(&registry, PROTO_ENCODING, &status), err);
        }
    }

    #[test]
    fn test_no_details_no_envelope() {
        let registry = registry();
        let err = RpcError::not_found("missing");
        let status = to_wire_status(&registry, PROTO_ENCODING, &err, None);
        assert!(status.details().is_none());
        assert_eq!(from_wire_status(&registry, PROTO_ENCODING, &status), err);
    }

    #[test]
    fn test_plain_errors_become_unknown() {
        let registry = registry();
        let err = std::io::Error::other("disk on fire");
        let status = to_wire_status(&registry, PROTO_ENCODING, &err, None);
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "disk on fire");
    }

    #[test]
    fn test_status_passes_through() {
        let registry = registry();
        let status = Status::unavailable("peer gone");
        assert_eq!(to_wire_status(&registry, "whatever", &status, None), status);
    }

    #[test]
    fn test_application_error_meta() {
        let registry = registry();
        let err = RpcError::invalid_argument("bad field")
            .with_detail(Detail::new(violation()))
            .with_detail(Detail::new(RetryInfo { retry_after_ms: 5 }));

        let mut recorder = ResponseRecorder::new();
        to_wire_status(&registry, JSON_ENCODING, &err, Some(&mut recorder));

        let meta = recorder.application_error_meta().unwrap();
        assert_eq!(meta.code, Some(Code::InvalidArgument));
        assert_eq!(meta.name, "FieldViolation");
        assert_eq!(
            meta.details,
            format!(
                "{} , {}",
                Detail::new(violation()).render(),
                Detail::new(RetryInfo { retry_after_ms: 5 }).render()
            )
        );
    }

    #[test]
    fn test_unrecognized_encoding() {
        let registry = registry();
        let err = RpcError::aborted("conflict").with_detail(Detail::new(violation()));

        let status = to_wire_status(&registry, "thrift", &err, None);
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("unrecognized encoding"));

        let status = to_wire_status(&registry, PROTO_ENCODING, &err, None);
        let decoded = from_wire_status(&registry, "thrift", &status);
        assert_eq!(decoded.code(), Code::Internal);
        assert!(decoded.message().contains("unrecognized encoding"));
    }

    #[test]
    fn test_raw_encoding_cannot_carry_details() {
        let registry = registry();
        let err = RpcError::aborted("conflict").with_detail(Detail::new(violation()));
        let status = to_wire_status(&registry, RAW_ENCODING, &err, None);
        assert_eq!(status.code(), Code::Internal);
        assert!(status.details().is_none());
    }

    #[test]
    fn test_invalid_code_in_envelope() {
        let registry = registry();
        let envelope = StatusEnvelope {
            code: 42,
            message: "from the future".to_string(),
            details: vec![],
        };
        let blob = registry.marshal(PROTO_ENCODING, &envelope).unwrap();
        let status =
            Status::unknown("from the future").with_details(blob.as_slice().to_vec());

        let decoded = from_wire_status(&registry, PROTO_ENCODING, &status);
        assert_eq!(decoded.code(), Code::Internal);
        assert_eq!(decoded.message(), "invalid status code: 42");
    }

    #[test]
    fn test_ok_code_in_envelope() {
        let registry = registry();
        let envelope = StatusEnvelope {
            code: 0,
            message: "not an error".to_string(),
            details: vec![DetailEnvelope {
                type_url: Echo::default().type_url(),
                value: b"\x0a\x02hi".to_vec(),
            }],
        };
        let blob = registry.marshal(PROTO_ENCODING, &envelope).unwrap();
        let status = Status::unknown("not an error").with_details(blob.as_slice().to_vec());

        let decoded = from_wire_status(&registry, PROTO_ENCODING, &status);
        assert_eq!(decoded.code(), Code::Internal);
        assert_eq!(decoded.message(), "invalid status code: 0");
        assert!(decoded.details().is_empty());
    }

    #[test]
    fn test_malformed_envelope() {
        let registry = registry();
        let status = Status::unknown("x").with_details(Bytes::from_static(b"\xff\xff\xff"));
        let decoded = from_wire_status(&registry, PROTO_ENCODING, &status);
        assert_eq!(decoded.code(), Code::Internal);
        assert!(decoded.message().starts_with("malformed status envelope"));
    }

    #[test]
    fn test_detail_decode_failure_is_per_element() {
        let registry = registry();
        let envelope = StatusEnvelope {
            code: GrpcCode::FailedPrecondition.into(),
            message: "partial".to_string(),
            details: vec![
                DetailEnvelope {
                    type_url: Echo::default().type_url(),
                    value: b"\x0a\x02hi".to_vec(),
                },
                DetailEnvelope {
                    type_url: RetryInfo::default().type_url(),
                    value: b"\x08\x07".to_vec(),
                },
            ],
        };
        let blob = registry.marshal(PROTO_ENCODING, &envelope).unwrap();
        let status = Status::unknown("partial").with_details(blob.as_slice().to_vec());

        let decoded = from_wire_status(&registry, PROTO_ENCODING, &status);
        assert_eq!(decoded.code(), Code::FailedPrecondition);
        assert_eq!(decoded.details().len(), 2);

        // Echo is not a registered detail type
        let first = &decoded.details()[0];
        assert!(first.is_undecodable());
        assert!(first.render().starts_with("failed to decode Echo, underlying error:"));
        assert_eq!(
            decoded.details()[1].downcast_ref::<RetryInfo>(),
            Some(&RetryInfo { retry_after_ms: 7 })
        );

        // undecodable entries are forwarded byte for byte
        let forwarded = to_wire_status(&registry, PROTO_ENCODING, &decoded, None);
        assert_eq!(from_wire_status(&registry, PROTO_ENCODING, &forwarded), decoded);
    }

    #[test]
    fn test_json_envelope_shape() {
        let registry = registry();
        let err = RpcError::not_found("gone").with_detail(Detail::new(violation()));
        let status = to_wire_status(&registry, JSON_ENCODING, &err, None);

        let json: serde_json::Value =
            serde_json::from_slice(status.details().unwrap()).unwrap();
        assert_eq!(json["code"], 5);
        assert_eq!(json["message"], "gone");
        assert_eq!(json["details"][0]["@type"], violation().type_url());
        assert!(json["details"][0]["value"].is_string());
    }
}
