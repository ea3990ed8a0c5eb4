//! Request and response records exchanged with the JWNET API.
//!
//! The field layout of these records belongs to the JWNET protocol. The client
//! only moves them over the wire, so each record is a JSON object whose fields
//! are passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! payload_record {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
        #[serde(transparent)]
        pub struct $name(Map<String, Value>);

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            /// Sets `key`, returning the record for chaining.
            pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.0.insert(key.into(), value.into());
                self
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }

            pub fn fields(&self) -> &Map<String, Value> {
                &self.0
            }

            pub fn into_fields(self) -> Map<String, Value> {
                self.0
            }
        }

        impl From<Map<String, Value>> for $name {
            fn from(fields: Map<String, Value>) -> Self {
                Self(fields)
            }
        }
    };
}

payload_record!(
    /// Manifest to register with JWNET.
    ManifestRegisterRequest
);
payload_record!(
    /// JWNET's answer to a manifest registration.
    ManifestRegisterResponse
);
payload_record!(
    /// Request for a block of reservation numbers.
    ReservationRequest
);
payload_record!(
    /// Reservation numbers allocated by JWNET.
    ReservationResponse
);
payload_record!(
    /// Query for registered manifests.
    InquiryRequest
);
payload_record!(
    /// Manifests matching an inquiry.
    InquiryResponse
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_as_plain_object() {
        let request = ManifestRegisterRequest::new()
            .with("manifestNo", "1234567890")
            .with("quantity", 12.5);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"manifestNo": "1234567890", "quantity": 12.5})
        );
    }

    #[test]
    fn test_record_keeps_unknown_fields() {
        let body = r#"{"reservationNos": ["R-1", "R-2"], "nested": {"a": [1, 2, null]}}"#;
        let response: ReservationResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.get("reservationNos"), Some(&json!(["R-1", "R-2"])));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::from_str::<Value>(body).unwrap()
        );
    }

    #[test]
    fn test_record_rejects_non_object() {
        assert!(serde_json::from_str::<InquiryResponse>("[1, 2, 3]").is_err());
        assert!(serde_json::from_str::<InquiryResponse>("\"text\"").is_err());
    }
}
