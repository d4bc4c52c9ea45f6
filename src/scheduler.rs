//! Deferral of repaints to the next point the host yields.

use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::{collections::VecDeque, rc::Rc};
use tracing::{trace, trace_span};
use wasm_bindgen::{closure::Closure, JsValue};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks at the end of the current turn, never synchronously inside [`Scheduler::schedule`].
pub trait Scheduler {
	fn schedule(&self, task: Task);
}

/// Queues tasks until [`QueueScheduler::run_until_idle`] is called.
///
/// This is the explicit yield point for native hosts and tests.
/// Clones share one queue.
#[derive(Clone, Default)]
pub struct QueueScheduler {
	queue: Rc<RefCell<VecDeque<Task>>>,
}

impl QueueScheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of queued tasks.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.queue.borrow().len()
	}

	/// Runs queued tasks, including ones they schedule, until the queue is empty. Returns how many ran.
	pub fn run_until_idle(&self) -> usize {
		let span = trace_span!("run_until_idle");
		let _enter = span.enter();

		let mut count = 0;
		loop {
			// The borrow must end before the task runs, since it may schedule more.
			let task = self.queue.borrow_mut().pop_front();
			match task {
				Some(task) => {
					task();
					count += 1;
				}
				None => break,
			}
		}
		trace!(count, "Idle.");
		count
	}
}

impl Scheduler for QueueScheduler {
	fn schedule(&self, task: Task) {
		self.queue.borrow_mut().push_back(task)
	}
}

impl Debug for QueueScheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueueScheduler").field("pending", &self.pending()).finish()
	}
}

/// Runs tasks as JavaScript microtasks, right after the current event handler returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrotaskScheduler;

impl Scheduler for MicrotaskScheduler {
	fn schedule(&self, task: Task) {
		let closure: Closure<dyn FnMut(JsValue)> = Closure::once(move |_: JsValue| task());
		let _ = js_sys::Promise::resolve(&JsValue::UNDEFINED).then(&closure);
		// The task itself is dropped after its one call. Only the small JS-side stub stays behind.
		closure.forget()
	}
}
