//! Serialized user-callback queue. Generalizes the
//! teacher's `core/drain.rs` signal/watch pattern — there, draining means
//! waiting for in-flight connections to finish before shutdown; here,
//! draining means flushing queued user callbacks on every tick — so the
//! naming and shape diverge deliberately while the "single serializing
//! point" idea is the same.

use std::collections::VecDeque;
use std::sync::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

/// FIFO queue of deferred invocations. `drain` never holds the queue lock
/// while invoking callbacks, so a callback enqueuing more work is safe and
/// simply deferred to the next tick.
#[derive(Default)]
pub struct CallbackDrain {
	queue: Mutex<VecDeque<Callback>>,
}

impl CallbackDrain {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, cb: impl FnOnce() + Send + 'static) {
		self.queue
			.lock()
			.expect("drain mutex poisoned")
			.push_back(Box::new(cb));
	}

	/// Moves all currently queued callbacks out from under the lock, then
	/// invokes them in enqueue order.
	pub fn drain(&self) {
		let pending: Vec<Callback> = {
			let mut queue = self.queue.lock().expect("drain mutex poisoned");
			queue.drain(..).collect()
		};
		for cb in pending {
			cb();
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.queue.lock().unwrap().len()
	}
}
