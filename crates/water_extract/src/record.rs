use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A frame after decoding: either a data record or an error object from the fetch process.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    ErrorSignal { message: String },
    Data(DataRecord),
}

/// One site/parameter combination with parallel sample arrays.
///
/// `times` and `values` have equal length once decoded; neither needs to be sorted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataRecord {
    #[serde(rename = "site_number", alias = "identifier")]
    pub identifier: String,
    pub code: String,
    #[serde(default)]
    pub site_id: Option<String>,
    // The fetch tool spells this key `paramter_id`.
    #[serde(default, rename = "paramter_id", alias = "parameter_id")]
    pub parameter_id: Option<String>,
    pub times: Vec<String>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("unrecognized record shape: {reason}")]
    UnknownShape {
        identifier: Option<String>,
        reason: String,
    },
    #[error("{identifier}: {times} times but {values} values")]
    LengthMismatch {
        identifier: String,
        times: usize,
        values: usize,
    },
}

impl DecodeError {
    /// Best-effort record identifier, for failure reporting.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            DecodeError::Json(_) => None,
            DecodeError::UnknownShape { identifier, .. } => identifier.as_deref(),
            DecodeError::LengthMismatch { identifier, .. } => Some(identifier),
        }
    }
}

/// Decodes one frame's bytes.
///
/// Objects carrying a `message` key are error signals regardless of their other keys.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedRecord, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Json)?;
    let Value::Object(map) = value else {
        return Err(DecodeError::UnknownShape {
            identifier: None,
            reason: "frame is not a JSON object".to_string(),
        });
    };

    if let Some(message) = map.get("message") {
        let message = match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Ok(DecodedRecord::ErrorSignal { message });
    }

    let identifier = salvage_identifier(&map);
    let record: DataRecord =
        serde_json::from_value(Value::Object(map)).map_err(|err| DecodeError::UnknownShape {
            identifier,
            reason: err.to_string(),
        })?;

    if record.times.len() != record.values.len() {
        return Err(DecodeError::LengthMismatch {
            identifier: record.identifier,
            times: record.times.len(),
            values: record.values.len(),
        });
    }

    Ok(DecodedRecord::Data(record))
}

fn salvage_identifier(map: &Map<String, Value>) -> Option<String> {
    ["site_number", "identifier"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_record_decodes_with_fetch_tool_keys() {
        let frame = br#"{"site_number":"05586100","code":"00060","site_id":"a","paramter_id":"b","times":["2021-01-01T00:00:00Z"],"values":[12.5]}"#;
        let DecodedRecord::Data(record) = decode_frame(frame).unwrap() else {
            panic!("expected data record");
        };
        assert_eq!(record.identifier, "05586100");
        assert_eq!(record.parameter_id.as_deref(), Some("b"));
        assert_eq!(record.values, vec![Some(12.5)]);
    }

    #[test]
    fn null_values_are_missing_samples() {
        let frame = br#"{"identifier":"X","code":"00065","times":["2021-01-01T00:00:00Z","2021-01-01T00:15:00Z"],"values":[null,3.0]}"#;
        let DecodedRecord::Data(record) = decode_frame(frame).unwrap() else {
            panic!("expected data record");
        };
        assert_eq!(record.values, vec![None, Some(3.0)]);
    }

    #[test]
    fn message_key_is_an_error_signal() {
        let out = decode_frame(br#"{"message":"watershed not found"}"#).unwrap();
        assert_eq!(
            out,
            DecodedRecord::ErrorSignal {
                message: "watershed not found".to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = decode_frame(b"{Host:localhost}").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(err.identifier().is_none());
    }

    #[test]
    fn missing_arrays_are_unknown_shape_with_identifier() {
        let err = decode_frame(br#"{"site_number":"05586100","code":"00060"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownShape { .. }));
        assert_eq!(err.identifier(), Some("05586100"));
    }

    #[test]
    fn unequal_arrays_are_rejected() {
        let err = decode_frame(
            br#"{"site_number":"S","code":"00060","times":["2021-01-01T00:00:00Z"],"values":[]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch {
                times: 1,
                values: 0,
                ..
            }
        ));
    }
}
