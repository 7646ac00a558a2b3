//! Wire format of the synthesis service.
//!
//! Requests are JSON text frames `{"id": <int>, "Items": [<float>; 100]}`.
//! Responses are binary frames: a little-endian `int32` request id followed
//! by little-endian `f32` PCM samples, mono, at [`SYNTH_SAMPLE_RATE`].
//!
//! [`SYNTH_SAMPLE_RATE`]: spaceloop_transport::SYNTH_SAMPLE_RATE

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("response of {len} bytes has no request id")]
    TooShort { len: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Request<'a> {
    id: i32,
    #[serde(rename = "Items")]
    items: &'a [f32],
}

/// A decoded response frame, still carrying the wire id.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub id: i32,
    pub samples: Vec<f32>,
}

pub fn encode_request(id: i32, values: &[f32]) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&Request { id, items: values })?)
}

pub fn decode_response(bytes: &[u8]) -> Result<WireResponse, ProtocolError> {
    let Some((head, body)) = bytes.split_first_chunk::<4>() else {
        return Err(ProtocolError::TooShort { len: bytes.len() });
    };
    let id = i32::from_le_bytes(*head);

    let chunks = body.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        log::warn!(
            "response {id}: ignoring {} trailing bytes",
            chunks.remainder().len()
        );
    }
    let samples = chunks
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(WireResponse { id, samples })
}

#[cfg(test)]
pub(crate) fn response_bytes(id: i32, samples: &[f32]) -> Vec<u8> {
    let mut bytes = id.to_le_bytes().to_vec();
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_field_names() {
        let json = encode_request(7, &[0.5, -1.0]).unwrap();
        assert_eq!(json, r#"{"id":7,"Items":[0.5,-1.0]}"#);
    }

    #[test]
    fn test_decode_response() {
        let response = decode_response(&response_bytes(-3, &[0.25, -0.5])).unwrap();
        assert_eq!(response.id, -3);
        assert_eq!(response.samples, vec![0.25, -0.5]);
    }

    #[test]
    fn test_id_only_response_is_empty_clip() {
        let response = decode_response(&response_bytes(1, &[])).unwrap();
        assert!(response.samples.is_empty());
    }

    #[test]
    fn test_short_response_is_rejected() {
        assert!(matches!(
            decode_response(&[1, 0, 0]),
            Err(ProtocolError::TooShort { len: 3 })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_dropped() {
        let mut bytes = response_bytes(2, &[1.0]);
        bytes.extend_from_slice(&[0xff, 0xff]);
        let response = decode_response(&bytes).unwrap();
        assert_eq!(response.samples, vec![1.0]);
    }
}
