//! Content codec
//!
//! Every crossing of message content between the stores and the channel
//! request shapes goes through these two functions.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Failed to encode {kind} content: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {kind} content: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, ContentError> {
    serde_json::to_string(value).map_err(|source| ContentError::Encode {
        kind: short_type_name::<T>(),
        source,
    })
}

pub fn decode<T: DeserializeOwned>(content: &str) -> Result<T, ContentError> {
    serde_json::from_str(content).map_err(|source| ContentError::Decode {
        kind: short_type_name::<T>(),
        source,
    })
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SmsRequest;

    #[test]
    fn test_decode_reports_target_type() {
        let err = decode::<SmsRequest>("{\"message\": 1}").unwrap_err();
        assert!(matches!(err, ContentError::Decode { kind: "SmsRequest", .. }));
        assert!(err.to_string().contains("SmsRequest"));
    }

    #[test]
    fn test_encode_then_decode() {
        let sms = SmsRequest {
            party: Default::default(),
            sender: "Kommunen".to_string(),
            mobile_number: "+46701234567".to_string(),
            message: "Hej".to_string(),
            priority: None,
        };
        let content = encode(&sms).unwrap();
        assert!(content.contains("\"mobileNumber\""));
        assert_eq!(decode::<SmsRequest>(&content).unwrap(), sms);
    }
}
