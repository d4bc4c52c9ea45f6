use crate::{
	fiber::{Fiber, Materialized},
	hooks::{detached_sink, StateSink, StateStore},
};
use std::{
	borrow::Cow,
	panic::{self, AssertUnwindSafe},
	rc::{Rc, Weak},
};
use tracing::{trace, warn};

/// Runtime knobs of a render pass.
#[derive(Debug, Clone)]
pub struct RenderConfig {
	/// Tag of the container a component result is wrapped in unless it already is a single element.
	pub group_tag: Cow<'static, str>,
	/// Maximum nesting of expansion and diffing. Deeper nodes are logged and materialized as `null`.
	pub depth_limit: usize,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			group_tag: Cow::Borrowed("div"),
			depth_limit: 512,
		}
	}
}

/// Everything a render pass mutates: the hook state store with its cursor, plus where state writes go.
///
/// Passes over the same context can't interleave, since each one needs it mutably.
/// Nested instantiation inside a pass is fine; the cursor is saved and restored per component.
pub struct RenderContext {
	pub(crate) store: StateStore,
	pub(crate) sink: Weak<dyn StateSink>,
	pub(crate) config: RenderConfig,
	pub(crate) pass: Option<Pass>,
}

/// What a running pass changed, to be committed or rolled back when it ends.
#[derive(Default)]
pub(crate) struct Pass {
	/// Each instantiation, with the fiber whose state range it took over.
	pub(crate) instantiated: Vec<(Option<Rc<Fiber>>, Rc<Fiber>)>,
	/// Old subtrees to excise on commit.
	pub(crate) discarded: Vec<Materialized>,
}

impl RenderContext {
	/// A context whose setters don't reach any reconciler.
	#[must_use]
	pub fn new() -> Self {
		Self::with_config(RenderConfig::default())
	}

	#[must_use]
	pub fn with_config(config: RenderConfig) -> Self {
		Self::with_sink(detached_sink(), config)
	}

	pub(crate) fn with_sink(sink: Weak<dyn StateSink>, config: RenderConfig) -> Self {
		Self {
			store: StateStore::new(),
			sink,
			config,
			pass: None,
		}
	}

	#[must_use]
	pub fn store(&self) -> &StateStore {
		&self.store
	}

	#[must_use]
	pub fn config(&self) -> &RenderConfig {
		&self.config
	}

	/// Runs `run` as one pass. Old subtrees it discards are only excised once it returns.
	///
	/// If it panics, every state range it moved goes back to the fiber it came from,
	/// state it allocated is freed and the panic continues.
	pub(crate) fn in_pass<T>(&mut self, run: impl FnOnce(&mut Self) -> T) -> T {
		if self.pass.is_some() {
			return run(self);
		}
		self.pass = Some(Pass::default());
		let result = panic::catch_unwind(AssertUnwindSafe(|| run(&mut *self)));
		let pass = self.pass.take().unwrap_or_default();
		match result {
			Ok(result) => {
				for node in &pass.discarded {
					self.excise(node)
				}
				trace!(instantiated = pass.instantiated.len(), discarded = pass.discarded.len(), "Committed pass.");
				result
			}
			Err(payload) => {
				self.roll_back(pass);
				panic::resume_unwind(payload)
			}
		}
	}

	fn roll_back(&mut self, pass: Pass) {
		warn!(instantiated = pass.instantiated.len(), "Render pass was interrupted. Rolling back its state changes.");
		for (old, fiber) in pass.instantiated.into_iter().rev() {
			let range = fiber.take_states();
			match (old, range) {
				(Some(old), range) => {
					if let Some(range) = range {
						self.store.claim(range, &old)
					}
					old.set_states(range)
				}
				(None, Some(range)) => {
					self.store.excise(range);
				}
				(None, None) => (),
			}
		}
	}
}

impl Default for RenderContext {
	fn default() -> Self {
		Self::new()
	}
}

impl core::fmt::Debug for RenderContext {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("RenderContext").field("store", &self.store).field("config", &self.config).finish()
	}
}
