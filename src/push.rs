//! Push notification bridge. Grounded on
//! `original_source/src/dht_proxy_client.cpp` (`pushNotificationReceived`,
//! `resubscribe`): maps a server-issued push token back to a listener and
//! either resubscribes (on a `timeout` message) or pulls fresh values with a
//! one-shot `get` (on any other wake-up).

use std::sync::Arc;

use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::client::{spawn_subscribe, ProxyClient};
use crate::registry::Listener;
use crate::types::InfoHash;

impl ProxyClient {
	/// Dispatches an out-of-band push message delivered by the host platform.
	/// Notifications without a `token` field are ignored; notifications whose
	/// token matches no listener are ignored (the listener may already have
	/// been cancelled).
	pub async fn push_notification_received(&self, notification: Json) {
		let Some(token) = notification.get("token").and_then(Json::as_u64) else {
			debug!("push notification without a token field; ignoring");
			return;
		};
		let Some(listener) = self.inner.listeners.find_by_push_token(token) else {
			debug!(push_token = token, "push notification matches no listener; ignoring");
			return;
		};

		if notification.get("timeout").is_some() {
			self.resubscribe(listener).await;
		} else {
			self.refresh_once(listener);
		}
	}

	/// Re-subscribes a push-mode listener: joins the prior worker, then issues
	/// a fresh `SUBSCRIBE` that repopulates the listener's push-token.
	async fn resubscribe(&self, listener: Arc<Listener>) {
		listener.cancel();
		listener.join().await;
		let (cancel, task) = spawn_subscribe(self.inner.clone(), listener.token, listener.key_hex.clone());
		listener.install(cancel, task);
	}

	/// Pulls fresh values for a listener's key via a one-shot `get`, reusing
	/// its stored callback and filter. Used when a push wake-up carries no
	/// `timeout`, meaning the server wants the client to re-fetch rather than
	/// resubscribe.
	fn refresh_once(&self, listener: Arc<Listener>) {
		let Ok(key) = InfoHash::from_hex(&listener.key_hex) else {
			warn!(key_hex = %listener.key_hex, "listener key is not valid hex; cannot refresh");
			return;
		};
		let callback = listener.callback.clone();
		let filter = listener.filter.clone();
		self.get(key, move |value| callback(value), |_ok| {}, filter);
	}
}
