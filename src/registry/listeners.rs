//! Long-lived listener bookkeeping. Grounded on the
//! teacher's `relay/pool.rs` `ConnectionPool`: a named collection of live
//! connections behind a dedicated lock, with `get_or_create`/`remove`/`list`
//! shaped operations — generalized here from connection-by-name to
//! listener-by-token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::codec::Value;

pub type ValueCallback = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type Filter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerMode {
	Stream,
	Push,
}

/// A long-lived subscription. The worker task is swapped out wholesale on
/// restart/resubscribe (invariant 1: at most one worker per token at a
/// time); callers must `take_task`/join the old one before installing a
/// new one.
pub struct Listener {
	pub token: u64,
	pub key_hex: String,
	pub callback: ValueCallback,
	pub filter: Option<Filter>,
	pub mode: ListenerMode,
	pub push_token: AtomicU64,
	cancel: Mutex<CancellationToken>,
	task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Listener {
	pub fn new(
		token: u64,
		key_hex: String,
		callback: ValueCallback,
		filter: Option<Filter>,
		mode: ListenerMode,
		cancel: CancellationToken,
		task: tokio::task::JoinHandle<()>,
	) -> Self {
		Listener {
			token,
			key_hex,
			callback,
			filter,
			mode,
			push_token: AtomicU64::new(0),
			cancel: Mutex::new(cancel),
			task: Mutex::new(Some(task)),
		}
	}

	pub fn accepts(&self, value: &Value) -> bool {
		self.filter.as_ref().is_none_or(|f| f(value))
	}

	pub fn cancel(&self) {
		self.cancel.lock().expect("listener mutex poisoned").cancel();
	}

	pub async fn join(&self) {
		let task = self.task.lock().expect("listener mutex poisoned").take();
		if let Some(task) = task {
			if let Err(e) = task.await {
				warn!(error = %e, "listener worker task panicked");
			}
		}
	}

	/// Installs a fresh worker (new cancellation token + task), used by
	/// `restart_all` and push resubscribe. The caller must have already
	/// joined the previous worker.
	pub fn install(&self, cancel: CancellationToken, task: tokio::task::JoinHandle<()>) {
		*self.cancel.lock().expect("listener mutex poisoned") = cancel;
		*self.task.lock().expect("listener mutex poisoned") = Some(task);
	}
}

/// Collection of live [`Listener`]s under a dedicated mutex, plus the
/// process-lifetime-monotonic token counter (invariant: tokens never
/// reused).
#[derive(Default)]
pub struct ListenerRegistry {
	next_token: AtomicU64,
	listeners: Mutex<Vec<Arc<Listener>>>,
}

impl ListenerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next_token(&self) -> u64 {
		self.next_token.fetch_add(1, Ordering::SeqCst)
	}

	pub fn insert(&self, listener: Arc<Listener>) {
		self.listeners
			.lock()
			.expect("listener registry mutex poisoned")
			.push(listener);
	}

	pub fn find(&self, token: u64) -> Option<Arc<Listener>> {
		self.listeners
			.lock()
			.expect("listener registry mutex poisoned")
			.iter()
			.find(|l| l.token == token)
			.cloned()
	}

	pub fn find_by_push_token(&self, push_token: u64) -> Option<Arc<Listener>> {
		self.listeners
			.lock()
			.expect("listener registry mutex poisoned")
			.iter()
			.find(|l| l.push_token.load(Ordering::SeqCst) == push_token)
			.cloned()
	}

	pub fn erase(&self, token: u64) -> Option<Arc<Listener>> {
		let mut listeners = self.listeners.lock().expect("listener registry mutex poisoned");
		let idx = listeners.iter().position(|l| l.token == token)?;
		Some(listeners.remove(idx))
	}

	/// Snapshot of all listeners, used by `restart_all` and shutdown.
	pub fn list(&self) -> Vec<Arc<Listener>> {
		self.listeners
			.lock()
			.expect("listener registry mutex poisoned")
			.clone()
	}

	pub fn take_all(&self) -> Vec<Arc<Listener>> {
		std::mem::take(&mut *self.listeners.lock().expect("listener registry mutex poisoned"))
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.listeners.lock().unwrap().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn noop_listener(registry: &ListenerRegistry, mode: ListenerMode) -> Arc<Listener> {
		let token = registry.next_token();
		Arc::new(Listener::new(
			token,
			"deadbeef".to_string(),
			Arc::new(|_| true),
			None,
			mode,
			CancellationToken::new(),
			tokio::spawn(async {}),
		))
	}

	#[tokio::test]
	async fn tokens_are_monotonic_and_unique() {
		let registry = ListenerRegistry::new();
		let a = noop_listener(&registry, ListenerMode::Stream);
		let b = noop_listener(&registry, ListenerMode::Stream);
		assert!(b.token > a.token);
		registry.insert(a.clone());
		registry.insert(b.clone());
		assert_eq!(registry.len(), 2);
		a.join().await;
		b.join().await;
	}

	#[tokio::test]
	async fn find_by_push_token_locates_listener() {
		let registry = ListenerRegistry::new();
		let l = noop_listener(&registry, ListenerMode::Push);
		l.push_token.store(42, Ordering::SeqCst);
		registry.insert(l.clone());
		let found = registry.find_by_push_token(42).unwrap();
		assert_eq!(found.token, l.token);
		l.join().await;
	}

	#[tokio::test]
	async fn erase_removes_and_returns() {
		let registry = ListenerRegistry::new();
		let l = noop_listener(&registry, ListenerMode::Stream);
		registry.insert(l.clone());
		let erased = registry.erase(l.token).unwrap();
		erased.join().await;
		assert_eq!(registry.len(), 0);
		assert!(registry.find(l.token).is_none());
	}
}
