use std::env;
use std::str::FromStr;

use anyhow::Context;

use crate::types::{Platform, ProxyEndpoint};

/// Reads an environment variable and parses it, returning `Ok(None)` when the
/// variable is unset. Mirrors the teacher's `config.rs` `parse::<T>("VAR")?.or(raw.field)`
/// idiom, generalized from the teacher's YAML-overlay config to this crate's
/// programmatic-or-env-overridden `ProxyClientConfig`.
fn parse<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
	T::Err: std::fmt::Display,
{
	match env::var(name) {
		Ok(v) if v.is_empty() => Ok(None),
		Ok(v) => v
			.parse::<T>()
			.map(Some)
			.map_err(|e| anyhow::anyhow!("failed to parse {name}: {e}")),
		Err(env::VarError::NotPresent) => Ok(None),
		Err(e) => Err(e).context(format!("failed to read {name}")),
	}
}

/// Builder-style configuration for [`crate::client::ProxyClient`]. Every
/// field may be supplied programmatically; `DHT_PROXY_HOST`,
/// `DHT_PROXY_DEVICE_KEY`, and `DHT_PROXY_TLS` environment variables override
/// unset fields at [`ProxyClientConfig::resolve`] time, in the style of the
/// teacher's `parse_config`.
#[derive(Clone, Debug, Default)]
pub struct ProxyClientConfig {
	pub host: Option<String>,
	pub device_key: Option<String>,
	pub use_tls: Option<bool>,
	pub platform: Platform,
}

impl ProxyClientConfig {
	pub fn new(host: impl Into<String>) -> Self {
		Self {
			host: Some(host.into()),
			..Default::default()
		}
	}

	pub fn with_device_key(mut self, key: impl Into<String>) -> Self {
		self.device_key = Some(key.into());
		self
	}

	pub fn with_tls(mut self, tls: bool) -> Self {
		self.use_tls = Some(tls);
		self
	}

	pub fn with_platform(mut self, platform: Platform) -> Self {
		self.platform = platform;
		self
	}

	/// Resolves environment overrides and produces the immutable
	/// [`ProxyEndpoint`]. An empty or entirely absent host is a
	/// [`crate::error::Error::Configuration`] condition, not a panic — the
	/// original silently no-ops on an empty `serverHost_`.
	pub fn resolve(self) -> anyhow::Result<ProxyEndpoint> {
		let host = parse::<String>("DHT_PROXY_HOST")?
			.or(self.host)
			.unwrap_or_default();
		let device_key = parse::<String>("DHT_PROXY_DEVICE_KEY")?.or(self.device_key);
		let use_tls = parse::<bool>("DHT_PROXY_TLS")?
			.or(self.use_tls)
			.unwrap_or(false);
		Ok(ProxyEndpoint {
			host,
			device_key,
			use_tls,
			platform: self.platform,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_programmatic_config() {
		let endpoint = ProxyClientConfig::new("dht.example.com:8080")
			.with_device_key("dk")
			.resolve()
			.unwrap();
		assert_eq!(endpoint.host, "dht.example.com:8080");
		assert!(endpoint.push_enabled());
	}

	#[test]
	fn empty_config_yields_empty_host() {
		let endpoint = ProxyClientConfig::default().resolve().unwrap();
		assert!(endpoint.host.is_empty());
	}
}
