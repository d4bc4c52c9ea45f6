//! The top level: owns the materialized tree, splices state-triggered updates into it and batches repaints.

use crate::{
	context::{RenderConfig, RenderContext},
	error::UpdateError,
	fiber::{Fiber, Materialized},
	hooks::{CellId, StateSink, StateStore},
	node::Node,
	render::Renderer,
	scheduler::Scheduler,
};
use core::{
	any::Any,
	cell::{Cell, Ref, RefCell},
	fmt::{self, Debug, Formatter},
};
use std::rc::{Rc, Weak};
use tracing::{info, instrument, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};

/// Renders a declared tree into `target` and keeps it up to date as component state changes.
///
/// State updates are diffed synchronously, so the materialized tree is always current.
/// Only the repaint is deferred through the [`Scheduler`], so any number of updates before it yields cause one repaint.
///
/// Clones share the same tree.
pub struct Reconciler<R: Renderer> {
	inner: Rc<Inner<R>>,
}

struct Inner<R: Renderer> {
	this: Weak<Self>,
	context: RefCell<RenderContext>,
	root: RefCell<Option<Materialized>>,
	renderer: RefCell<R>,
	target: R::Target,
	scheduler: Rc<dyn Scheduler>,
	in_flight: Cell<bool>,
}

impl<R: Renderer> Clone for Reconciler<R> {
	fn clone(&self) -> Self {
		Self { inner: Rc::clone(&self.inner) }
	}
}

impl<R: Renderer> Reconciler<R> {
	#[must_use]
	pub fn new(renderer: R, target: R::Target, scheduler: impl Scheduler + 'static) -> Self {
		Self::with_config(renderer, target, scheduler, RenderConfig::default())
	}

	#[must_use]
	pub fn with_config(renderer: R, target: R::Target, scheduler: impl Scheduler + 'static, config: RenderConfig) -> Self {
		let inner = Rc::new_cyclic(|this: &Weak<Inner<R>>| {
			let sink: Weak<dyn StateSink> = this.clone();
			Inner {
				this: this.clone(),
				context: RefCell::new(RenderContext::with_sink(sink, config)),
				root: RefCell::new(None),
				renderer: RefCell::new(renderer),
				target,
				scheduler: Rc::new(scheduler),
				in_flight: Cell::new(false),
			}
		});
		Self { inner }
	}

	/// Replaces the whole tree with a fresh expansion of `root` and paints it right away.
	///
	/// State of a previously rendered tree is excised first. Nothing is carried over.
	///
	/// # Errors
	///
	/// [`UpdateError::Busy`] if called while a render pass is running.
	///
	/// # Panics
	///
	/// Iff a component function panics. The state store stays consistent, but no tree is left rendered.
	#[instrument(skip_all)]
	pub fn render(&self, root: impl Into<Node>) -> Result<(), UpdateError> {
		let root = root.into();
		{
			let mut context = self.inner.context.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
			let mut current = self.inner.root.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
			if let Some(previous) = current.take() {
				trace!("Excising previous tree.");
				context.excise(&previous);
			}
			*current = Some(context.expand(&root));
		}
		self.inner.paint()
	}

	/// Re-renders `fiber` with its last props, splices the result into its slot and schedules a repaint.
	///
	/// # Errors
	///
	/// - [`UpdateError::Detached`] if `fiber` is not part of this reconciler's current tree.
	/// - [`UpdateError::Busy`] if called while a render pass is running.
	///
	/// # Panics
	///
	/// Iff a component function panics.
	#[instrument(skip_all, fields(tag = fiber.tag()))]
	pub fn notify_update(&self, fiber: &Rc<Fiber>) -> Result<(), UpdateError> {
		self.inner.notify_update(fiber)?;
		self.inner.schedule_repaint();
		Ok(())
	}

	/// Excises the whole tree and clears the target.
	///
	/// # Errors
	///
	/// [`UpdateError::Busy`] if called while a render pass is running.
	#[instrument(skip_all)]
	pub fn unmount(&self) -> Result<(), UpdateError> {
		{
			let mut context = self.inner.context.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
			let mut current = self.inner.root.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
			if let Some(previous) = current.take() {
				context.excise(&previous);
			}
		}
		self.inner.paint()
	}

	/// The current materialized tree, if any.
	///
	/// # Panics
	///
	/// Iff called while a render pass is running.
	#[must_use]
	pub fn root(&self) -> Option<Materialized> {
		self.inner.root.borrow().clone()
	}

	/// Finds the fiber whose `id` attribute is `id` in the current tree.
	///
	/// # Panics
	///
	/// Iff called while a render pass is running.
	#[must_use]
	pub fn find_by_id(&self, id: &str) -> Option<Rc<Fiber>> {
		self.inner.root.borrow().as_ref().and_then(|root| root.find_by_id(id))
	}

	/// # Panics
	///
	/// Iff called while painting.
	#[must_use]
	pub fn renderer(&self) -> Ref<'_, R> {
		self.inner.renderer.borrow()
	}

	#[must_use]
	pub fn target(&self) -> &R::Target {
		&self.inner.target
	}

	/// Whether a repaint is scheduled but hasn't run yet.
	#[must_use]
	pub fn is_repaint_pending(&self) -> bool {
		self.inner.in_flight.get()
	}

	/// Runs `f` against the hook state store.
	///
	/// # Errors
	///
	/// [`UpdateError::Busy`] if called while a render pass is running.
	pub fn with_store<T>(&self, f: impl FnOnce(&StateStore) -> T) -> Result<T, UpdateError> {
		let context = self.inner.context.try_borrow().map_err(|_| UpdateError::Busy)?;
		Ok(f(context.store()))
	}
}

impl<R: Renderer> Inner<R> {
	fn notify_update(&self, fiber: &Rc<Fiber>) -> Result<(), UpdateError> {
		let mut context = self.context.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
		let depth = {
			let root = self.root.try_borrow().map_err(|_| UpdateError::Busy)?;
			if !is_attached(&root, fiber) {
				if cfg!(feature = "log-paths") {
					warn!(path = %fiber.path(), "Update target is not part of the rendered tree.");
				} else {
					warn!(tag = fiber.tag(), "Update target is not part of the rendered tree.");
				}
				return Err(UpdateError::Detached);
			}
			let top = fiber.topmost();
			fiber.depth() + root.as_ref().and_then(|root| root.nesting_of(&top)).unwrap_or(0)
		};

		let next = context.update_at(fiber, depth);

		let mut root = self.root.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
		match fiber.parent() {
			None => match root.as_mut().and_then(|root| root.slot_of(fiber)) {
				Some(slot) => *slot = next,
				None => return Err(UpdateError::Detached),
			},
			Some(parent) => {
				let mut children = parent.children_mut();
				match children.iter_mut().find_map(|child| child.slot_of(fiber)) {
					Some(slot) => *slot = next,
					None => return Err(UpdateError::Detached),
				}
			}
		}
		Ok(())
	}

	fn schedule_repaint(&self) {
		if self.in_flight.replace(true) {
			trace!("Repaint already pending.");
			return;
		}
		let this = self.this.clone();
		self.scheduler.schedule(Box::new(move || {
			if let Some(this) = this.upgrade() {
				this.in_flight.set(false);
				if let Err(error) = this.paint() {
					warn!(%error, "Deferred repaint failed.");
				}
			}
		}));
	}

	fn paint(&self) -> Result<(), UpdateError> {
		let root = self.root.try_borrow().map_err(|_| UpdateError::Busy)?;
		let mut renderer = self.renderer.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
		renderer.clear(&self.target);
		if let Some(tree) = &*root {
			renderer.paint(tree, &self.target);
		}

		if let Ok(context) = self.context.try_borrow() {
			let store = context.store();
			info!("State cell count/free slots: {}/{}", store.len(), store.free_slots());
			if STATIC_MAX_LEVEL >= Level::WARN && store.free_slots() >= 100 {
				warn!(
					"The state store holds many free slots ({}).\n\
					This may point to components being remounted instead of updated.",
					store.free_slots()
				)
			}
		}
		Ok(())
	}
}

/// Whether every link from `fiber` up to the root is still in place.
fn is_attached(root: &Option<Materialized>, fiber: &Rc<Fiber>) -> bool {
	let mut current = Rc::clone(fiber);
	loop {
		match current.parent() {
			Some(parent) => {
				if !parent.children().iter().any(|child| child.nesting_of(&current).is_some()) {
					return false;
				}
				current = parent;
			}
			None => return root.as_ref().map_or(false, |root| root.nesting_of(&current).is_some()),
		}
	}
}

impl<R: Renderer> StateSink for Inner<R> {
	fn apply(&self, cell: CellId, write: Box<dyn FnOnce(&mut Box<dyn Any>) -> Result<(), UpdateError> + '_>) -> Result<(), UpdateError> {
		let owner = {
			let mut context = self.context.try_borrow_mut().map_err(|_| UpdateError::Busy)?;
			context.store.write(cell, write)?
		};
		let owner = owner.upgrade().ok_or(UpdateError::Detached)?;
		self.notify_update(&owner)?;
		self.schedule_repaint();
		Ok(())
	}
}

impl<R: Renderer> Debug for Reconciler<R> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reconciler")
			.field("context", &self.inner.context.try_borrow().map(|context| format!("{:?}", context)).unwrap_or_else(|_| "<busy>".to_owned()))
			.field("in_flight", &self.inner.in_flight.get())
			.finish()
	}
}
