//! End-to-end scenarios against a mock proxy server (get, put, listen/cancel,
//! and connectivity recovery).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dht_proxy_client::{InfoHash, ProxyClient, ProxyClientConfig, Value};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_of(server: &MockServer) -> String {
	server.uri().trim_start_matches("http://").to_string()
}

/// S1 — get, two values: the server streams two newline-delimited values then
/// closes; both are delivered to `value_cb` in order and `done_cb` fires once
/// with `ok == true`.
#[tokio::test]
async fn s1_get_streams_two_values_in_order() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/deadbeef"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string("{\"id\":\"1\",\"data\":\"YQ==\"}\n{\"id\":\"2\",\"data\":\"Yg==\"}\n"),
		)
		.mount(&server)
		.await;

	let client = ProxyClient::start(ProxyClientConfig::new(host_of(&server))).unwrap();

	let seen = Arc::new(Mutex::new(Vec::new()));
	let seen2 = seen.clone();
	let done = Arc::new(AtomicBool::new(false));
	let done_ok = Arc::new(AtomicUsize::new(0));
	let done2 = done.clone();
	let done_ok2 = done_ok.clone();

	client.get(
		InfoHash::new(vec![0xde, 0xad, 0xbe, 0xef]),
		move |v: &Value| {
			seen2.lock().unwrap().push(v.id.clone().unwrap_or_default());
			true
		},
		move |ok| {
			done2.store(true, Ordering::SeqCst);
			done_ok2.store(ok as usize, Ordering::SeqCst);
		},
		None,
	);

	// Drain until the stream closes and done_cb has run.
	for _ in 0..50 {
		client.periodic().await;
		if done.load(Ordering::SeqCst) {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}

	assert!(done.load(Ordering::SeqCst), "done_cb never fired");
	assert_eq!(done_ok.load(Ordering::SeqCst), 1);
	assert_eq!(*seen.lock().unwrap(), vec!["1".to_string(), "2".to_string()]);
}

/// S2 — put permanent: the body carries `"permanent": true` and the done
/// callback observes success once the server replies 200.
#[tokio::test]
async fn s2_put_permanent_value() {
	let server = MockServer::start().await;
	let key = InfoHash::new(vec![0xc0, 0xde]);
	Mock::given(method("POST"))
		.and(path(format!("/{}", key.to_hex())))
		.and(body_string_contains("\"permanent\":true"))
		.respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
		.mount(&server)
		.await;

	let client = ProxyClient::start(ProxyClientConfig::new(host_of(&server))).unwrap();
	let value = Value::new("7", json!({"data": "eA=="}));

	let done = Arc::new(AtomicBool::new(false));
	let done_ok = Arc::new(AtomicUsize::new(0));
	let done2 = done.clone();
	let done_ok2 = done_ok.clone();

	client.put(
		key,
		value,
		move |ok| {
			done2.store(true, Ordering::SeqCst);
			done_ok2.store(ok as usize, Ordering::SeqCst);
		},
		true,
	);

	for _ in 0..50 {
		client.periodic().await;
		if done.load(Ordering::SeqCst) {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}

	assert!(done.load(Ordering::SeqCst), "done_cb never fired");
	assert_eq!(done_ok.load(Ordering::SeqCst), 1);
}

/// S3 — listen then cancel: `cancel_listen` returns true for a live token,
/// and no further callback runs after it returns.
#[tokio::test]
async fn s3_listen_then_cancel() {
	let server = MockServer::start().await;
	Mock::given(method("LISTEN"))
		.and(path("/cafe"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
		.mount(&server)
		.await;

	let client = ProxyClient::start(ProxyClientConfig::new(host_of(&server))).unwrap();
	let calls = Arc::new(AtomicUsize::new(0));
	let calls2 = calls.clone();

	let key = InfoHash::new(vec![0xca, 0xfe]);
	let token = client.listen(
		key.clone(),
		move |_v| {
			calls2.fetch_add(1, Ordering::SeqCst);
			true
		},
		None,
		None,
	);

	tokio::time::sleep(Duration::from_millis(50)).await;
	let cancelled = client.cancel_listen(&key, token).await;
	assert!(cancelled);
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	// cancelling an already-removed token returns false
	let cancelled_again = client.cancel_listen(&key, token).await;
	assert!(!cancelled_again);
}

/// S5 — connectivity recovery: proxy info starts at `good+dubious == 0` for
/// both families, then a later poll reports `ipv4.good > 0`; `periodic`
/// transitions `statusIPv4` to `Connected` and restarts listeners.
#[tokio::test]
async fn s5_connectivity_recovery_restarts_listeners() {
	let server = MockServer::start().await;
	let attempt = Arc::new(AtomicUsize::new(0));
	let attempt2 = attempt.clone();

	Mock::given(method("GET"))
		.and(path("/"))
		.respond_with(move |_: &wiremock::Request| {
			let n = attempt2.fetch_add(1, Ordering::SeqCst);
			if n == 0 {
				ResponseTemplate::new(200).set_body_string(
					r#"{"node_id":"n1","public_ip":"192.0.2.1:4222","ipv4":{"good":0,"dubious":0},"ipv6":{"good":0,"dubious":0}}"#,
				)
			} else {
				ResponseTemplate::new(200).set_body_string(
					r#"{"node_id":"n1","public_ip":"192.0.2.1:4222","ipv4":{"good":3,"dubious":0},"ipv6":{"good":0,"dubious":0}}"#,
				)
			}
		})
		.mount(&server)
		.await;
	Mock::given(method("LISTEN"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
		.mount(&server)
		.await;

	let client = ProxyClient::start(ProxyClientConfig::new(host_of(&server))).unwrap();
	let _token = client.listen(InfoHash::new(vec![0x01]), |_v| true, None, None);

	// `nextProxyConfirmation` first fires 5s after start; drive `periodic`
	// past that point and confirm the real-clock wait until the family
	// transitions to `Connected` on the second proxy-info poll.
	let mut reached_connected = false;
	for _ in 0..80 {
		client.periodic().await;
		if client.get_status(dht_proxy_client::Family::V4).is_connected() {
			reached_connected = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}

	assert!(reached_connected, "ipv4 never transitioned to Connected");
	assert!(attempt.load(Ordering::SeqCst) >= 2, "expected at least two proxy-info polls");
}
