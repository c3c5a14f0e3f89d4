//! Connectivity monitor. Grounded on
//! `original_source/src/dht_proxy_client.cpp` (`confirmProxy`,
//! `confirmConnectivity`, `getConnectivityStatus`): two distinct scheduler
//! handles so an external event can nudge `nextConnectivityConfirmation` to
//! "now" without disturbing the slower `nextProxyConfirmation` cadence.

use std::time::Instant;

use reqwest::{Method, StatusCode};
use tracing::{info, warn};

use crate::client::{
	ProxyClient, CONNECTIVITY_CONFIRMATION_INTERVAL, PROXY_CONFIRMATION_CONNECTED_INTERVAL,
	PROXY_CONFIRMATION_DISCONNECTED_INTERVAL,
};
use crate::codec;
use crate::http_client::DEFAULT_TIMEOUT;
use crate::types::{Family, NodeStatus};

impl ProxyClient {
	/// The `nextProxyConfirmation` scheduler entry: fetches proxy info, derives
	/// per-family status, restarts listeners on a Disconnected -> Connected
	/// transition, and re-aims itself.
	pub(crate) async fn confirm_proxy(&self) {
		let was_v4 = self.get_status(Family::V4);
		let was_v6 = self.get_status(Family::V6);
		let was_connected = was_v4.is_connected() || was_v6.is_connected();

		let now_connected = self.get_connectivity_status().await;

		if let Some(metrics) = &self.inner.metrics {
			if !was_v4.is_connected() && self.get_status(Family::V4).is_connected() {
				metrics
					.connectivity_transitions
					.get_or_create(&crate::metrics::FamilyLabels { family: "v4" })
					.inc();
			}
			if !was_v6.is_connected() && self.get_status(Family::V6).is_connected() {
				metrics
					.connectivity_transitions
					.get_or_create(&crate::metrics::FamilyLabels { family: "v6" })
					.inc();
			}
		}

		if !was_connected && now_connected {
			info!("proxy connectivity restored; restarting listeners");
			if let Some(metrics) = &self.inner.metrics {
				metrics.listener_restarts.inc();
			}
			self.restart_all_listeners().await;
		}

		let interval = if now_connected {
			PROXY_CONFIRMATION_CONNECTED_INTERVAL
		} else {
			PROXY_CONFIRMATION_DISCONNECTED_INTERVAL
		};
		self.inner
			.scheduler
			.edit(self.inner.next_proxy_confirmation, Instant::now() + interval);
	}

	/// The `nextConnectivityConfirmation` scheduler entry. Kept distinct from
	/// `nextProxyConfirmation` so a transport failure elsewhere can edit that
	/// handle to "now" for a faster re-check without racing this cadence.
	pub(crate) fn confirm_connectivity(&self) {
		self.inner
			.scheduler
			.edit(self.inner.next_connectivity_confirmation, Instant::now() + CONNECTIVITY_CONFIRMATION_INTERVAL);
	}

	/// Synchronously fetches `GET /`, updates the cached `ProxyInfo` and
	/// per-family statuses, and returns whether either family is connected.
	/// A transport, protocol, or parse failure forces both families to
	/// `Disconnected` and edits `nextProxyConfirmation` to "now" so the next
	/// tick retries immediately.
	pub(crate) async fn get_connectivity_status(&self) -> bool {
		let url = self.inner.endpoint.base_url();
		let result = self.inner.http.one_shot(Method::GET, &url, None, DEFAULT_TIMEOUT).await;

		let info = match result {
			Ok((StatusCode::OK, body)) => codec::parse_proxy_info(&body).ok(),
			Ok(_) => None,
			Err(e) => {
				warn!(error = %e, "proxy info fetch failed");
				None
			}
		};

		let Some(info) = info else {
			self.mark_disconnected();
			return false;
		};

		let status_v4 = info.ipv4.status();
		let status_v6 = info.ipv6.status();
		*self.inner.status_v4.lock().expect("status mutex poisoned") = status_v4;
		*self.inner.status_v6.lock().expect("status mutex poisoned") = status_v6;
		*self.inner.node_id.lock().expect("node id mutex poisoned") = info.node_id.clone();
		*self.inner.public_ip.lock().expect("public ip mutex poisoned") = info.public_ip.clone();
		*self.inner.last_family_counters.lock().expect("counters mutex poisoned") = (info.ipv4.clone(), info.ipv6.clone());

		status_v4.is_connected() || status_v6.is_connected()
	}

	fn mark_disconnected(&self) {
		*self.inner.status_v4.lock().expect("status mutex poisoned") = NodeStatus::Disconnected;
		*self.inner.status_v6.lock().expect("status mutex poisoned") = NodeStatus::Disconnected;
		self.inner.trigger_connectivity_reprobe();
	}

	/// Rebuilds every listener's request with method `LISTEN`, reusing its
	/// stored callback and filter, after joining its previous worker. Only
	/// called by the connectivity monitor, on a Disconnected -> Connected
	/// transition.
	pub(crate) async fn restart_all_listeners(&self) {
		for listener in self.inner.listeners.list() {
			listener.cancel();
			listener.join().await;
			let (cancel, task) = crate::client::restart_stream_listen(
				self.inner.clone(),
				listener.key_hex.clone(),
				listener.callback.clone(),
				listener.filter.clone(),
			);
			listener.install(cancel, task);
		}
	}
}
