//! Public facade: `ProxyClient` wraps the shared transport, scheduler, and
//! registries behind `get`/`put`/`listen`/`cancel_listen`/`shutdown`/`periodic`,
//! mirroring the original `get`/`put`/`listen`/`cancelListen`/`shutdown`/
//! `periodic` surface through the teacher's public-module convention
//! (`client/mod.rs`: a `Client` wrapping the transport plus a handful of
//! focused helper types).

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::codec::{self, Value};
use crate::config::ProxyClientConfig;
use crate::error::{Error, Result};
use crate::http_client::{HttpStreamingClient, DEFAULT_TIMEOUT, LISTEN_TIMEOUT};
use crate::metrics::Metrics;
use crate::registry::{Filter, Listener, ListenerMode, ListenerRegistry, Operation, OperationRegistry, ValueCallback};
use crate::scheduler::{self, Scheduler};
use crate::types::{Family, InfoHash, NodeStats, NodeStatus, ProxyEndpoint};

pub type DoneCallback = Box<dyn FnOnce(bool) + Send>;
pub type ShutdownCallback = Box<dyn FnOnce() + Send>;

const PROXY_CONFIRMATION_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub(crate) const PROXY_CONFIRMATION_CONNECTED_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub(crate) const PROXY_CONFIRMATION_DISCONNECTED_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const CONNECTIVITY_CONFIRMATION_INTERVAL: Duration = Duration::from_secs(3);

/// All client-wide shared state. Each field is guarded by its own lock, and
/// no lock here is ever held across HTTP I/O, a worker join, or a user
/// callback invocation.
pub(crate) struct Inner {
	pub endpoint: ProxyEndpoint,
	pub http: HttpStreamingClient,
	pub scheduler: Scheduler,
	pub drain: crate::drain::CallbackDrain,
	pub operations: OperationRegistry,
	pub listeners: ListenerRegistry,
	pub status_v4: Mutex<NodeStatus>,
	pub status_v6: Mutex<NodeStatus>,
	pub node_id: Mutex<String>,
	pub public_ip: Mutex<Option<String>>,
	pub last_family_counters: Mutex<(crate::types::FamilyCounters, crate::types::FamilyCounters)>,
	pub next_proxy_confirmation: scheduler::Handle,
	pub next_connectivity_confirmation: scheduler::Handle,
	pub callback_id_counter: AtomicU64,
	pub metrics: Option<Arc<Metrics>>,
}

/// Client for participating in a DHT via HTTP streaming requests to a
/// single configured proxy server.
#[derive(Clone)]
pub struct ProxyClient {
	pub(crate) inner: Arc<Inner>,
}

impl ProxyClient {
	/// Starts the client against `config`. An empty/unconfigured host is a
	/// [`Error::Configuration`], matching the original's silent no-op on an
	/// empty `serverHost_` — here surfaced as an explicit error rather than a
	/// quietly inert client, since Rust constructors should not return a
	/// value that looks usable but silently does nothing.
	pub fn start(config: ProxyClientConfig) -> Result<Self> {
		Self::start_with_metrics(config, None)
	}

	pub fn start_with_metrics(config: ProxyClientConfig, metrics: Option<Arc<Metrics>>) -> Result<Self> {
		let endpoint = config.resolve().map_err(|_| Error::Configuration)?;
		if endpoint.host.is_empty() {
			return Err(Error::Configuration);
		}
		let http = HttpStreamingClient::new()?;
		let scheduler = Scheduler::new();
		let now = Instant::now();
		let next_proxy_confirmation = scheduler.add(now + PROXY_CONFIRMATION_INITIAL_DELAY);
		let next_connectivity_confirmation = scheduler.add(now + PROXY_CONFIRMATION_INITIAL_DELAY);

		info!(host = %endpoint.host, push = endpoint.push_enabled(), "starting DHT proxy client");

		let inner = Inner {
			endpoint,
			http,
			scheduler,
			drain: crate::drain::CallbackDrain::new(),
			operations: OperationRegistry::new(),
			listeners: ListenerRegistry::new(),
			status_v4: Mutex::new(NodeStatus::Disconnected),
			status_v6: Mutex::new(NodeStatus::Disconnected),
			node_id: Mutex::new(String::new()),
			public_ip: Mutex::new(None),
			last_family_counters: Mutex::new(Default::default()),
			next_proxy_confirmation,
			next_connectivity_confirmation,
			callback_id_counter: AtomicU64::new(0),
			metrics,
		};
		Ok(ProxyClient { inner: Arc::new(inner) })
	}

	fn url_for(&self, key: &InfoHash) -> String {
		format!("{}/{}", self.inner.endpoint.base_url(), key.to_hex())
	}

	/// Opens a streaming `GET` and delivers each parsed value through
	/// `value_cb`. `done_cb` fires once the stream ends, is cancelled, or a
	/// transport/parse failure occurs.
	#[instrument(skip(self, value_cb, done_cb, filter))]
	pub fn get(
		&self,
		key: InfoHash,
		value_cb: impl Fn(&Value) -> bool + Send + Sync + 'static,
		done_cb: impl FnOnce(bool) + Send + 'static,
		filter: Option<Filter>,
	) {
		let inner = self.inner.clone();
		let url = self.url_for(&key);
		let cancel = CancellationToken::new();
		let op_cancel = cancel.clone();

		if let Some(metrics) = &inner.metrics {
			metrics
				.operations_started
				.get_or_create(&crate::metrics::OperationLabels { kind: "get" })
				.inc();
		}

		let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let ok_flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
		let task_finished = finished.clone();
		let task_ok = ok_flag.clone();
		let task_inner = inner.clone();
		let value_cb = Arc::new(value_cb);

		let task = tokio::spawn(async move {
			let mut stream = task_inner
				.http
				.open_stream(Method::GET, &url, None, LISTEN_TIMEOUT, cancel);
			loop {
				match stream.fetch_chunk().await {
					None => break,
					Some(Ok(frame)) => match codec::parse_value(&frame) {
						Ok(value) => {
							let cb = value_cb.clone();
							let value_for_cb = value.clone();
							let (tx, rx) = tokio::sync::oneshot::channel();
							task_inner.drain.push(move || {
								let _ = tx.send(cb(&value_for_cb));
							});
							// Blocks until `periodic` next drains the queue and
							// actually runs the callback, so a `false` return is
							// observed before the next chunk is fetched.
							if !rx.await.unwrap_or(false) {
								break;
							}
						}
						Err(_) => {
							task_ok.store(false, Ordering::SeqCst);
						}
					},
					Some(Err(Error::Cancelled)) => break,
					Some(Err(_)) => {
						task_ok.store(false, Ordering::SeqCst);
						break;
					}
				}
			}
			let ok = task_ok.load(Ordering::SeqCst);
			if !ok {
				task_inner.trigger_connectivity_reprobe();
			}
			let metrics = task_inner.metrics.clone();
			task_inner.drain.push(move || {
				if let Some(metrics) = metrics {
					metrics
						.operations_finished
						.get_or_create(&crate::metrics::OperationLabels { kind: "get" })
						.inc();
				}
				done_cb(ok)
			});
			task_finished.store(true, Ordering::SeqCst);
		});

		let op = Arc::new(Operation::new(finished, ok_flag, op_cancel, task));
		inner.operations.push(op);
	}

	/// Issues a `POST` of `value`, optionally marked permanent.
	#[instrument(skip(self, value, done_cb))]
	pub fn put(&self, key: InfoHash, value: Value, done_cb: impl FnOnce(bool) + Send + 'static, permanent: bool) {
		let inner = self.inner.clone();
		let url = self.url_for(&key);
		let cancel = CancellationToken::new();

		if let Some(metrics) = &inner.metrics {
			metrics
				.operations_started
				.get_or_create(&crate::metrics::OperationLabels { kind: "put" })
				.inc();
		}

		let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let ok_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let task_finished = finished.clone();
		let task_ok = ok_flag.clone();

		let task = tokio::spawn(async move {
			let ok = match codec::serialize_put(&value, permanent) {
				Ok(body) => match inner
					.http
					.one_shot(Method::POST, &url, Some(body), DEFAULT_TIMEOUT)
					.await
				{
					Ok((status, _)) => status == reqwest::StatusCode::OK,
					Err(_) => false,
				},
				Err(_) => false,
			};
			task_ok.store(ok, Ordering::SeqCst);
			if !ok {
				inner.trigger_connectivity_reprobe();
			}
			let metrics = inner.metrics.clone();
			inner.drain.push(move || {
				if let Some(metrics) = metrics {
					metrics
						.operations_finished
						.get_or_create(&crate::metrics::OperationLabels { kind: "put" })
						.inc();
				}
				done_cb(ok)
			});
			task_finished.store(true, Ordering::SeqCst);
		});
		let op = Arc::new(Operation::new(finished, ok_flag, cancel, task));
		self.inner.operations.push(op);
	}

	/// Registers a listener and returns its token. Stream mode opens a
	/// long-lived `LISTEN`; push mode issues a `SUBSCRIBE` and returns once
	/// the server has assigned a push token.
	#[instrument(skip(self, cb, filter))]
	pub fn listen(
		&self,
		key: InfoHash,
		cb: impl Fn(&Value) -> bool + Send + Sync + 'static,
		filter: Option<Filter>,
		where_pred: Option<Filter>,
	) -> u64 {
		let inner = self.inner.clone();
		let token = inner.listeners.next_token();
		let combined: Option<Filter> = match (filter, where_pred) {
			(Some(a), Some(b)) => Some(Arc::new(move |v: &Value| a(v) && b(v))),
			(Some(a), None) => Some(a),
			(None, Some(b)) => Some(b),
			(None, None) => None,
		};
		let callback: ValueCallback = Arc::new(cb);

		if inner.endpoint.push_enabled() {
			let (cancel, task) = spawn_subscribe(inner.clone(), token, key.to_hex());
			let listener = Arc::new(Listener::new(
				token,
				key.to_hex(),
				callback,
				combined,
				ListenerMode::Push,
				cancel,
				task,
			));
			inner.listeners.insert(listener);
		} else {
			let (cancel, task) = spawn_stream_listen(inner.clone(), key.to_hex(), callback.clone(), combined.clone());
			let listener = Arc::new(Listener::new(
				token,
				key.to_hex(),
				callback,
				combined,
				ListenerMode::Stream,
				cancel,
				task,
			));
			inner.listeners.insert(listener);
		}
		token
	}

	/// Cancels a listener. For push-mode listeners, waits for the pending
	/// subscribe to finish (so the push token is known), then fires an
	/// `UNSUBSCRIBE`. Returns `true` iff a matching token was found.
	#[instrument(skip(self))]
	pub async fn cancel_listen(&self, key: &InfoHash, token: u64) -> bool {
		let Some(listener) = self.inner.listeners.find(token) else {
			return false;
		};
		listener.cancel();
		listener.join().await;
		if listener.mode == ListenerMode::Push {
			let inner = self.inner.clone();
			let url = format!("{}/{}", inner.endpoint.base_url(), key.to_hex());
			tokio::spawn(async move {
				let _ = inner
					.http
					.one_shot(Method::from_bytes(b"UNSUBSCRIBE").unwrap(), &url, None, DEFAULT_TIMEOUT)
					.await;
			});
		}
		if let Some(listener) = self.inner.listeners.erase(token) {
			listener.join().await;
		}
		true
	}

	/// Cancels every operation and listener, joining all workers, then
	/// invokes `cb`.
	#[instrument(skip(self, cb))]
	pub async fn shutdown(&self, cb: ShutdownCallback) {
		let operations = self.inner.operations.take_all();
		for op in &operations {
			op.cancel();
		}
		for op in &operations {
			op.join().await;
		}
		let listeners = self.inner.listeners.take_all();
		for listener in &listeners {
			listener.cancel();
		}
		for listener in &listeners {
			listener.join().await;
		}
		cb();
	}

	/// Advances the scheduler clock, drains queued callbacks, reaps
	/// finished operations, runs connectivity confirmation, and returns the
	/// next time `periodic` should be called again.
	pub async fn periodic(&self) -> Option<Instant> {
		let now = Instant::now();
		let (due, next) = self.inner.scheduler.run(now);
		for handle in due {
			if handle == self.inner.next_proxy_confirmation {
				self.confirm_proxy().await;
			} else if handle == self.inner.next_connectivity_confirmation {
				self.confirm_connectivity();
			}
		}
		self.inner.drain.drain();
		for op in self.inner.operations.take_finished() {
			op.cancel();
			op.join().await;
		}
		next
	}

	pub fn get_status(&self, family: Family) -> NodeStatus {
		match family {
			Family::V4 => *self.inner.status_v4.lock().expect("status mutex poisoned"),
			Family::V6 => *self.inner.status_v6.lock().expect("status mutex poisoned"),
		}
	}

	pub fn is_running(&self, family: Family) -> bool {
		self.get_status(family).is_connected()
	}

	pub fn get_nodes_stats(&self, family: Family) -> NodeStats {
		let counters = self.inner.last_family_counters.lock().expect("counters mutex poisoned");
		match family {
			Family::V4 => NodeStats::from(&counters.0),
			Family::V6 => NodeStats::from(&counters.1),
		}
	}

	/// Resolves the proxy's last-seen `public_ip` for `family` into concrete
	/// socket addresses via the system resolver.
	pub fn get_public_address(&self, family: Family) -> Result<Vec<SocketAddr>> {
		let ip = self.inner.public_ip.lock().expect("public ip mutex poisoned").clone();
		let ip = ip.ok_or(Error::Parse)?;
		let (addr, port) = crate::types::parse_public_ip(&ip, family)?;
		let port: u16 = port.parse().map_err(|_| Error::Parse)?;
		(addr.as_str(), port)
			.to_socket_addrs()
			.map(|addrs| addrs.collect())
			.map_err(|_| Error::Transport("failed to resolve public address".to_string()))
	}
}

impl Inner {
	pub(crate) fn trigger_connectivity_reprobe(&self) {
		self.scheduler.edit(self.next_proxy_confirmation, Instant::now());
	}
}

fn spawn_stream_listen(
	inner: Arc<Inner>,
	key_hex: String,
	callback: ValueCallback,
	filter: Option<Filter>,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
	let cancel = CancellationToken::new();
	let task_cancel = cancel.clone();
	let url = format!("{}/{}", inner.endpoint.base_url(), key_hex);
	let task = tokio::spawn(async move {
		let mut stream = inner
			.http
			.open_stream(Method::from_bytes(b"LISTEN").unwrap(), &url, None, LISTEN_TIMEOUT, task_cancel);
		loop {
			match stream.fetch_chunk().await {
				None => break,
				Some(Ok(frame)) => {
					if let Ok(value) = codec::parse_value(&frame) {
						if filter.as_ref().is_none_or(|f| f(&value)) {
							let cb = callback.clone();
							let value_for_cb = value.clone();
							let (tx, rx) = tokio::sync::oneshot::channel();
							inner.drain.push(move || {
								let _ = tx.send(cb(&value_for_cb));
							});
							// Blocks until `periodic` next drains the queue, so a
							// `false` return is observed before the next chunk is
							// fetched, terminating the loop.
							if !rx.await.unwrap_or(false) {
								break;
							}
						}
					}
				}
				Some(Err(Error::Cancelled)) => break,
				Some(Err(_)) => {
					inner.trigger_connectivity_reprobe();
					break;
				}
			}
		}
	});
	(cancel, task)
}

pub(crate) fn spawn_subscribe(
	inner: Arc<Inner>,
	token: u64,
	key_hex: String,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
	let cancel = CancellationToken::new();
	let url = format!("{}/{}", inner.endpoint.base_url(), key_hex);
	let task = tokio::spawn(async move {
		let callback_id = inner.callback_id_counter.fetch_add(1, Ordering::SeqCst);
		let device_key = inner.endpoint.device_key.clone().unwrap_or_default();
		let body = codec::serialize_subscribe_body(&device_key, callback_id, inner.endpoint.platform.is_android());
		match inner
			.http
			.one_shot(Method::from_bytes(b"SUBSCRIBE").unwrap(), &url, Some(body), DEFAULT_TIMEOUT)
			.await
		{
			Ok((status, text)) if status == reqwest::StatusCode::OK => {
				if let Ok(push_token) = codec::parse_token(&text) {
					if let Some(listener) = inner.listeners.find(token) {
						listener.push_token.store(push_token, Ordering::SeqCst);
					}
				} else {
					warn!("subscribe response did not contain a token");
				}
			}
			_ => {
				inner.trigger_connectivity_reprobe();
			}
		}
	});
	(cancel, task)
}

pub(crate) use spawn_stream_listen as restart_stream_listen;
