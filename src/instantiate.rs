use crate::{
	context::RenderContext,
	fiber::Fiber,
	hooks::{ScopeGuard, StateRange},
	node::{Component, Element, Node},
};
use std::rc::Rc;
use tracing::{trace, trace_span};

impl RenderContext {
	/// Runs `component`'s function and wraps its result into one [`Fiber`] that owns the state cells it read.
	///
	/// Unless the result is a single element, it is wrapped in a [`RenderConfig::group_tag`](`crate::RenderConfig::group_tag`) element.
	/// That includes primitives and other components, not only sequences, so the container shows up when painted.
	///
	/// With `prior`, the function re-reads those cells instead of allocating.
	/// The fiber's children are left unmaterialized; [`RenderContext::expand`] and [`RenderContext::diff`] fill them in.
	///
	/// # Panics
	///
	/// Iff the component function panics. The cursor is restored and cells allocated by the interrupted call are freed first.
	pub fn instantiate(&mut self, component: &Rc<Component>, prior: Option<StateRange>) -> Rc<Fiber> {
		let span = trace_span!("instantiate", component = component.name(), key = ?component.key(), ?prior);
		let _enter = span.enter();

		let mut guard = ScopeGuard::begin(&mut self.store, prior);
		let declared = component.invoke(&mut guard.hooks(&self.sink));

		let element = match declared {
			Node::Element(element) => element,
			other => Rc::new(Element::group(self.config.group_tag.clone(), other)),
		};
		let fiber = Rc::new(Fiber::instance(element, Rc::clone(component)));
		let states = guard.finish(&fiber);
		fiber.set_states(states);
		trace!(?states, "Instantiated.");
		fiber
	}

	/// Instantiates `component` in place of `old`, if any, taking over its state range.
	/// The current pass records this so that it can be rolled back.
	pub(crate) fn reinstantiate(&mut self, component: &Rc<Component>, old: Option<&Rc<Fiber>>) -> Rc<Fiber> {
		let fiber = self.instantiate(component, old.and_then(|old| old.states()));
		if let Some(old) = old {
			// The range now belongs to `fiber`, so excising `old` later must not touch it.
			old.take_states();
		}
		if let Some(pass) = &mut self.pass {
			pass.instantiated.push((old.cloned(), Rc::clone(&fiber)));
		}
		fiber
	}
}
