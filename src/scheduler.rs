//! Single-thread cooperative scheduler. Has no thread of
//! its own: the facade's `periodic` drives it by calling [`Scheduler::run`]
//! on every tick. Named periodic tasks (`nextProxyConfirmation`,
//! `nextConnectivityConfirmation`) keep a single [`Handle`] and re-aim it via
//! [`Scheduler::edit`] rather than scheduling a fresh entry each time.
//! No direct teacher analogue exists for a deadline scheduler
//! in this corpus; the lazy-deletion binary-heap technique below is a
//! standard, idiomatic way to support `edit` without an O(n) heap scan.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(u64);

struct Job {
	time: Instant,
	version: u64,
	seq: u64,
}

struct Inner {
	next_id: u64,
	next_seq: u64,
	jobs: HashMap<u64, Job>,
	heap: BinaryHeap<Reverse<(Instant, u64, u64, u64)>>,
}

pub struct Scheduler {
	inner: Mutex<Inner>,
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new()
	}
}

impl Scheduler {
	pub fn new() -> Self {
		Scheduler {
			inner: Mutex::new(Inner {
				next_id: 0,
				next_seq: 0,
				jobs: HashMap::new(),
				heap: BinaryHeap::new(),
			}),
		}
	}

	/// Schedules a new entry for `time`, returning a handle that [`edit`]
	/// can later re-aim.
	///
	/// [`edit`]: Scheduler::edit
	pub fn add(&self, time: Instant) -> Handle {
		let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
		let id = inner.next_id;
		inner.next_id += 1;
		let seq = inner.next_seq;
		inner.next_seq += 1;
		inner.jobs.insert(
			id,
			Job {
				time,
				version: 0,
				seq,
			},
		);
		inner.heap.push(Reverse((time, seq, id, 0)));
		Handle(id)
	}

	/// Re-aims an existing handle to `time`. Idempotent: calling `edit` with
	/// the handle's current time still only ever leaves one live entry for
	/// that handle (invariant 3) because stale heap entries are recognised
	/// by a version stamp and skipped in [`run`].
	///
	/// [`run`]: Scheduler::run
	pub fn edit(&self, handle: Handle, time: Instant) {
		let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
		let seq = {
			let Some(job) = inner.jobs.get_mut(&handle.0) else {
				return;
			};
			job.time = time;
			job.version += 1;
			job.seq
		};
		let version = inner.jobs[&handle.0].version;
		inner.heap.push(Reverse((time, seq, handle.0, version)));
	}

	pub fn cancel(&self, handle: Handle) {
		let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
		inner.jobs.remove(&handle.0);
	}

	/// Pops every entry due at or before `now`, in (time, insertion-order)
	/// order, and returns them alongside the next wake time (if any entries
	/// remain).
	pub fn run(&self, now: Instant) -> (Vec<Handle>, Option<Instant>) {
		let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
		let mut due = Vec::new();
		loop {
			let Some(Reverse((time, _seq, id, version))) = inner.heap.peek().copied() else {
				break;
			};
			let current = inner.jobs.get(&id).map(|j| j.version);
			if current != Some(version) {
				// Stale entry from a prior `edit`/removed job; discard.
				inner.heap.pop();
				continue;
			}
			if time > now {
				break;
			}
			inner.heap.pop();
			due.push(Handle(id));
		}
		let next = loop {
			match inner.heap.peek().copied() {
				None => break None,
				Some(Reverse((time, _seq, id, version))) => {
					if inner.jobs.get(&id).map(|j| j.version) == Some(version) {
						break Some(time);
					}
					inner.heap.pop();
				}
			}
		};
		(due, next)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn due_entries_returned_in_time_order() {
		let sched = Scheduler::new();
		let base = Instant::now();
		let a = sched.add(base);
		let b = sched.add(base + Duration::from_millis(1));
		let (due, _) = sched.run(base + Duration::from_secs(1));
		assert_eq!(due, vec![a, b]);
	}

	#[test]
	fn edit_reaims_without_duplicate_firing() {
		let sched = Scheduler::new();
		let base = Instant::now();
		let h = sched.add(base);
		sched.edit(h, base + Duration::from_secs(10));
		let (due, next) = sched.run(base + Duration::from_secs(1));
		assert!(due.is_empty());
		assert_eq!(next, Some(base + Duration::from_secs(10)));

		let (due2, _) = sched.run(base + Duration::from_secs(11));
		assert_eq!(due2, vec![h]);
		let (due3, next3) = sched.run(base + Duration::from_secs(12));
		assert!(due3.is_empty());
		assert_eq!(next3, None);
	}

	#[test]
	fn cancel_removes_entry() {
		let sched = Scheduler::new();
		let base = Instant::now();
		let h = sched.add(base);
		sched.cancel(h);
		let (due, next) = sched.run(base + Duration::from_secs(1));
		assert!(due.is_empty());
		assert_eq!(next, None);
	}
}
