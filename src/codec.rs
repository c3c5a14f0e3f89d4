//! JSON encode/decode for DHT values, token assignments, and proxy-info
//! documents. Grounded on the teacher's `json.rs` (`serde_json::Value`
//! traversal helpers) and `parse/sse.rs` (parsing one streamed frame at a
//! time, tolerating a malformed frame without aborting the whole stream).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::types::ProxyInfo;

/// An opaque DHT value. Unknown fields round-trip losslessly through the
/// embedded [`serde_json::Value`]; `id` is the only field this crate itself
/// inspects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Value {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(flatten)]
	pub extra: Json,
}

impl Value {
	pub fn new(id: impl Into<String>, extra: Json) -> Self {
		Value {
			id: Some(id.into()),
			extra,
		}
	}
}

/// Parses one newline-delimited frame as a DHT value. A frame that is not
/// valid JSON is a soft failure: callers mark the surrounding operation
/// `ok = false` and keep draining the stream.
pub fn parse_value(frame: &str) -> Result<Value> {
	let frame = frame.trim();
	if frame.is_empty() {
		return Err(Error::Parse);
	}
	serde_json::from_str(frame).map_err(Into::into)
}

/// Parses the `{"token": <u64>}` document returned by a push-mode `SUBSCRIBE`.
pub fn parse_token(frame: &str) -> Result<u64> {
	#[derive(Deserialize)]
	struct TokenDoc {
		token: u64,
	}
	let doc: TokenDoc = serde_json::from_str(frame.trim())?;
	Ok(doc.token)
}

/// Parses the `GET /` proxy-info document.
pub fn parse_proxy_info(frame: &str) -> Result<ProxyInfo> {
	serde_json::from_str(frame.trim()).map_err(Into::into)
}

/// Serialises a value for `PUT`, optionally flagging it permanent.
pub fn serialize_put(value: &Value, permanent: bool) -> Result<String> {
	let mut doc = serde_json::to_value(value)?;
	if permanent {
		doc.as_object_mut()
			.ok_or(Error::Parse)?
			.insert("permanent".to_string(), Json::Bool(true));
	}
	Ok(doc.to_string())
}

/// Builds the single-line push-subscribe body. Embedded newlines are
/// replaced with spaces, matching the original's `fillBodyToGetToken`
/// (it must fit on one `\n`-terminated line).
pub fn serialize_subscribe_body(device_key: &str, callback_id: u64, is_android: bool) -> String {
	#[derive(Serialize)]
	struct SubscribeBody<'a> {
		key: &'a str,
		callback_id: u64,
		#[serde(rename = "isAndroid")]
		is_android: bool,
	}
	let body = SubscribeBody {
		key: device_key,
		callback_id,
		is_android,
	};
	serde_json::to_string(&body)
		.unwrap_or_default()
		.replace('\n', " ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_value_with_id() {
		let v = parse_value(r#"{"id":"1","data":"YQ=="}"#).unwrap();
		assert_eq!(v.id.as_deref(), Some("1"));
	}

	#[test]
	fn rejects_blank_frame() {
		assert!(parse_value("   ").is_err());
	}

	#[test]
	fn parses_token() {
		assert_eq!(parse_token(r#"{"token":42}"#).unwrap(), 42);
	}

	#[test]
	fn serializes_permanent_put() {
		let v = Value::new("7", serde_json::json!({"data": "eA=="}));
		let s = serialize_put(&v, true).unwrap();
		let parsed: Json = serde_json::from_str(&s).unwrap();
		assert_eq!(parsed["permanent"], Json::Bool(true));
		assert_eq!(parsed["id"], Json::String("7".to_string()));
	}

	#[test]
	fn subscribe_body_has_no_embedded_newline() {
		let body = serialize_subscribe_body("dk", 3, true);
		assert!(!body.contains('\n'));
		assert!(body.contains("\"isAndroid\":true"));
	}
}
