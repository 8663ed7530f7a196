//! Cursor encode/decode, spec.md §4.9/§6: a base64-url JSON blob carrying
//! the last row's sort vector plus its id, so pagination can resume at the
//! exact row without depending on storage order.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use opql_ast::Value;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub id: String,
    pub order: Vec<Value>,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("Cursor serializes without error");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(text: &str) -> Result<Cursor, PlanError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| PlanError::InvalidCursor { reason: e.to_string() })?;
        serde_json::from_slice(&bytes).map_err(|e| PlanError::InvalidCursor { reason: e.to_string() })
    }
}

#[cfg(test)]
mod test {
    use super::Cursor;
    use opql_ast::Value;

    #[test]
    fn round_trips_through_base64_json() {
        let cursor = Cursor { id: "task-3".to_string(), order: vec![Value::Date(chrono::Utc::now()), Value::Text("task-3".into())] };
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(decoded.id, "task-3");
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(Cursor::decode("not-valid-base64!!").is_err());
    }
}
