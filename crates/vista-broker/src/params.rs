//! RPC parameter model.
//!
//! Broker parameters come in three wire encodings. They are modeled as a
//! closed enum so the frame encoder's switch is exhaustive.

use std::collections::BTreeMap;

use crate::error::{BrokerError, Result};

/// One positional parameter of an RPC invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcParam {
    /// An ordinary string value.
    String(String),
    /// A literal value, passed to the M side unquoted.
    Literal(String),
    /// A named array (key/value list). Serialized as JSON on the wire.
    NamedArray(BTreeMap<String, String>),
}

impl RpcParam {
    /// The one-digit encoding-kind byte for this variant.
    pub fn kind_byte(&self) -> char {
        match self {
            RpcParam::String(_) => '0',
            RpcParam::Literal(_) => '1',
            RpcParam::NamedArray(_) => '2',
        }
    }

    /// The wire payload for this parameter.
    pub fn payload(&self) -> Result<String> {
        let payload = match self {
            RpcParam::String(s) | RpcParam::Literal(s) => s.clone(),
            RpcParam::NamedArray(map) => serde_json::to_string(map)
                .map_err(|e| BrokerError::Handshake(format!("unserializable named array: {}", e)))?,
        };
        // The length field is three decimal digits; longer payloads cannot
        // be framed.
        if payload.len() > 999 {
            return Err(BrokerError::ParamTooLong { len: payload.len() });
        }
        Ok(payload)
    }
}

impl From<&str> for RpcParam {
    fn from(s: &str) -> Self {
        RpcParam::String(s.to_string())
    }
}

impl From<String> for RpcParam {
    fn from(s: String) -> Self {
        RpcParam::String(s)
    }
}

/// Convenience constructor for a list of plain string parameters.
pub fn string_params<I, S>(values: I) -> Vec<RpcParam>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(|v| RpcParam::String(v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bytes() {
        assert_eq!(RpcParam::String("x".into()).kind_byte(), '0');
        assert_eq!(RpcParam::Literal("x".into()).kind_byte(), '1');
        assert_eq!(RpcParam::NamedArray(BTreeMap::new()).kind_byte(), '2');
    }

    #[test]
    fn test_named_array_payload_is_sorted_json() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        let payload = RpcParam::NamedArray(map).payload().unwrap();
        assert_eq!(payload, r#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn test_oversized_param_rejected() {
        let big = "x".repeat(1000);
        let result = RpcParam::String(big).payload();
        assert!(matches!(result, Err(BrokerError::ParamTooLong { len: 1000 })));
    }

    #[test]
    fn test_string_params_helper() {
        let params = string_params(["1", "2"]);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], RpcParam::String("1".to_string()));
    }
}
