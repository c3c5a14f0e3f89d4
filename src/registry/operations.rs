//! One-shot operation bookkeeping. Generalizes the
//! teacher's `store/mod.rs` pattern of a named collection behind a
//! dedicated lock with copy-out reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A single in-flight `get`/`put`/proxy-info request.
pub struct Operation {
	pub finished: Arc<AtomicBool>,
	pub ok: Arc<AtomicBool>,
	cancel: CancellationToken,
	task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Operation {
	/// `finished`/`ok` must be the same flags the spawned `task` mutates —
	/// the registry only ever reads them, it never owns the transition.
	pub fn new(
		finished: Arc<AtomicBool>,
		ok: Arc<AtomicBool>,
		cancel: CancellationToken,
		task: tokio::task::JoinHandle<()>,
	) -> Self {
		Operation {
			finished,
			ok,
			cancel,
			task: Mutex::new(Some(task)),
		}
	}

	pub fn is_finished(&self) -> bool {
		self.finished.load(Ordering::SeqCst)
	}

	/// Idempotent; safe to call even if the operation already completed.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub async fn join(&self) {
		let task = self.task.lock().expect("operation mutex poisoned").take();
		if let Some(task) = task {
			if let Err(e) = task.await {
				warn!(error = %e, "operation worker task panicked");
			}
		}
	}
}

/// Tracks all live [`Operation`]s under a dedicated mutex, per invariant 2:
/// a `finished` operation is removed within one tick of being observed.
#[derive(Default)]
pub struct OperationRegistry {
	operations: Mutex<Vec<Arc<Operation>>>,
}

impl OperationRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, op: Arc<Operation>) {
		self.operations
			.lock()
			.expect("operation registry mutex poisoned")
			.push(op);
	}

	/// Returns operations whose `finished` flag is set, removing them from
	/// the registry. Callers must cancel (defensively) and join these
	/// outside any lock.
	pub fn take_finished(&self) -> Vec<Arc<Operation>> {
		let mut operations = self.operations.lock().expect("operation registry mutex poisoned");
		let mut finished = Vec::new();
		operations.retain(|op| {
			if op.is_finished() {
				finished.push(op.clone());
				false
			} else {
				true
			}
		});
		finished
	}

	/// Removes every operation regardless of state, for shutdown.
	pub fn take_all(&self) -> Vec<Arc<Operation>> {
		std::mem::take(&mut *self.operations.lock().expect("operation registry mutex poisoned"))
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.operations.lock().unwrap().len()
	}
}
