use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A DHT key. The wire format is the lowercase hex encoding of the underlying bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InfoHash(Vec<u8>);

impl InfoHash {
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	pub fn to_hex(&self) -> String {
		hex::encode(&self.0)
	}

	pub fn from_hex(hex_str: &str) -> Result<Self> {
		hex::decode(hex_str).map(Self).map_err(|_| Error::Parse)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for InfoHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "InfoHash({})", self.to_hex())
	}
}

impl fmt::Display for InfoHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

/// Host platform supplied at start, replacing the original's compile-time
/// `#ifdef __ANDROID__` / `#ifdef __APPLE__` selection of the push-subscribe
/// body's `isAndroid` flag (see DESIGN.md, Open Question 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Platform {
	Android,
	Apple,
	#[default]
	Other,
}

impl Platform {
	pub fn is_android(self) -> bool {
		matches!(self, Platform::Android)
	}
}

/// Immutable configuration of the remote proxy, fixed for the lifetime of a
/// running client.
#[derive(Clone, Debug)]
pub struct ProxyEndpoint {
	pub host: String,
	pub device_key: Option<String>,
	pub use_tls: bool,
	pub platform: Platform,
}

impl ProxyEndpoint {
	pub fn push_enabled(&self) -> bool {
		self.device_key.as_deref().is_some_and(|k| !k.is_empty())
	}

	pub fn base_url(&self) -> String {
		let scheme = if self.use_tls { "https" } else { "http" };
		format!("{scheme}://{}", self.host.trim_end_matches('/'))
	}
}

/// Address family the monitor and facade report status for independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
	V4,
	V6,
}

/// Per-family connectivity, derived solely from `good + dubious > 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeStatus {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

impl NodeStatus {
	pub fn is_connected(self) -> bool {
		matches!(self, NodeStatus::Connected)
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FamilyCounters {
	#[serde(default)]
	pub good: u64,
	#[serde(default)]
	pub dubious: u64,
}

impl FamilyCounters {
	pub fn status(&self) -> NodeStatus {
		if self.good + self.dubious > 0 {
			NodeStatus::Connected
		} else {
			NodeStatus::Disconnected
		}
	}
}

/// The document returned by `GET /`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProxyInfo {
	#[serde(default)]
	pub node_id: String,
	#[serde(default)]
	pub public_ip: Option<String>,
	#[serde(default)]
	pub ipv4: FamilyCounters,
	#[serde(default)]
	pub ipv6: FamilyCounters,
}

/// Aggregate node statistics surfaced by `getNodesStats`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NodeStats {
	pub good_nodes: u64,
	pub dubious_nodes: u64,
}

impl From<&FamilyCounters> for NodeStats {
	fn from(c: &FamilyCounters) -> Self {
		NodeStats {
			good_nodes: c.good,
			dubious_nodes: c.dubious,
		}
	}
}

/// Parses the three accepted forms of `public_ip`:
/// `<v4>:<port>`, `[<v6>]:<port>`, `[<v6>:<v4>]:<port>`.
///
/// The original implementation truncates the embedded IPv4 address by one
/// character in the dual-stack branch; this is a corrected, literal split on
/// `:` (see DESIGN.md, Open Question 2).
pub fn parse_public_ip(ip: &str, family: Family) -> Result<(String, String)> {
	let ip = ip.trim();
	if let Some(rest) = ip.strip_prefix('[') {
		let end = rest.find(']').ok_or(Error::Parse)?;
		let inner = &rest[..end];
		let port = rest
			.get(end + 1..)
			.and_then(|p| p.strip_prefix(':'))
			.ok_or(Error::Parse)?;
		return match inner.rsplit_once(':') {
			Some((v6, v4)) => match family {
				Family::V6 => Ok((v6.to_string(), port.to_string())),
				Family::V4 => Ok((v4.to_string(), port.to_string())),
			},
			None => match family {
				Family::V6 => Ok((inner.to_string(), port.to_string())),
				Family::V4 => Err(Error::Parse),
			},
		};
	}
	match family {
		Family::V4 => {
			let (addr, port) = ip.rsplit_once(':').ok_or(Error::Parse)?;
			Ok((addr.to_string(), port.to_string()))
		}
		Family::V6 => Err(Error::Parse),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_plain_v4() {
		let (addr, port) = parse_public_ip("192.0.2.5:4222", Family::V4).unwrap();
		assert_eq!(addr, "192.0.2.5");
		assert_eq!(port, "4222");
	}

	#[test]
	fn parses_bracketed_v6_only() {
		let (addr, port) = parse_public_ip("[2001:db8::1]:4222", Family::V6).unwrap();
		assert_eq!(addr, "2001:db8::1");
		assert_eq!(port, "4222");
	}

	#[test]
	fn parses_dual_stack() {
		let ip = "[2001:db8::1:192.0.2.5]:4222";
		let (v6, port) = parse_public_ip(ip, Family::V6).unwrap();
		assert_eq!(v6, "2001:db8::1");
		assert_eq!(port, "4222");
		let (v4, port) = parse_public_ip(ip, Family::V4).unwrap();
		assert_eq!(v4, "192.0.2.5");
		assert_eq!(port, "4222");
	}

	#[test]
	fn info_hash_hex_roundtrip() {
		let h = InfoHash::new(vec![0xde, 0xad, 0xbe, 0xef]);
		assert_eq!(h.to_hex(), "deadbeef");
		assert_eq!(InfoHash::from_hex(&h.to_hex()).unwrap(), h);
	}

	#[test]
	fn info_hash_from_hex_rejects_garbage() {
		assert!(InfoHash::from_hex("not hex").is_err());
	}
}
