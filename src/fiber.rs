//! Materialized nodes: the result of expanding a declared tree once.
//!
//! Ownership flows strictly from parent to child.
//! The parent link of a [`Fiber`] is a [`Weak`] used only to find the slot a re-rendered instance is spliced back into.

use crate::{
	hooks::StateRange,
	node::{Attributes, Component, Element, Event, EventHandler, Key, Node, Primitive, Value},
};
use core::{
	cell::{Cell, Ref, RefCell},
	fmt::{self, Debug, Formatter},
};
use std::rc::{Rc, Weak};

/// A node of a fully expanded tree. No component references remain.
#[derive(Debug, Clone)]
pub enum Materialized {
	Primitive(Primitive),
	Sequence(Vec<Materialized>),
	Fiber(Rc<Fiber>),
}

impl Materialized {
	#[must_use]
	pub fn as_fiber(&self) -> Option<&Rc<Fiber>> {
		match self {
			Materialized::Fiber(fiber) => Some(fiber),
			_ => None,
		}
	}

	/// Depth-first search for the first fiber matching `predicate`.
	pub fn find(&self, predicate: &mut dyn FnMut(&Rc<Fiber>) -> bool) -> Option<Rc<Fiber>> {
		match self {
			Materialized::Primitive(_) => None,
			Materialized::Sequence(items) => items.iter().find_map(|item| item.find(predicate)),
			Materialized::Fiber(fiber) => {
				if predicate(fiber) {
					return Some(Rc::clone(fiber));
				}
				fiber.children().iter().find_map(|child| child.find(predicate))
			}
		}
	}

	/// Finds the fiber whose `id` attribute is `id`.
	#[must_use]
	pub fn find_by_id(&self, id: &str) -> Option<Rc<Fiber>> {
		self.find(&mut |fiber| fiber.attribute("id").and_then(Value::as_text) == Some(id))
	}

	/// Concatenated text of all leaves, in paint order.
	#[must_use]
	pub fn text_content(&self) -> String {
		let mut text = String::new();
		self.collect_text(&mut text);
		text
	}

	fn collect_text(&self, text: &mut String) {
		match self {
			Materialized::Primitive(primitive) => {
				if let Some(leaf) = primitive.text() {
					text.push_str(&leaf)
				}
			}
			Materialized::Sequence(items) => items.iter().for_each(|item| item.collect_text(text)),
			Materialized::Fiber(fiber) => fiber.children().iter().for_each(|child| child.collect_text(text)),
		}
	}

	/// How many sequences deep `target` sits in this node: `Some(0)` if it is this node, [`None`] if it isn't in it.
	/// Looks through sequences only.
	pub(crate) fn nesting_of(&self, target: &Rc<Fiber>) -> Option<usize> {
		match self {
			Materialized::Fiber(fiber) => Some(0).filter(|_| Rc::ptr_eq(fiber, target)),
			Materialized::Sequence(items) => items.iter().find_map(|item| item.nesting_of(target)).map(|nesting| nesting + 1),
			Materialized::Primitive(_) => None,
		}
	}

	/// The slot holding `target`, looking through sequences only.
	pub(crate) fn slot_of<'a>(&'a mut self, target: &Rc<Fiber>) -> Option<&'a mut Materialized> {
		if matches!(self, Materialized::Fiber(fiber) if Rc::ptr_eq(fiber, target)) {
			return Some(self);
		}
		if let Materialized::Sequence(items) = self {
			for item in items {
				if let Some(slot) = item.slot_of(target) {
					return Some(slot);
				}
			}
		}
		None
	}

	fn adopt(&self, parent: &Weak<Fiber>) {
		match self {
			Materialized::Primitive(_) => (),
			Materialized::Sequence(items) => items.iter().for_each(|item| item.adopt(parent)),
			Materialized::Fiber(fiber) => fiber.set_parent(parent.clone()),
		}
	}
}

impl From<Primitive> for Materialized {
	fn from(primitive: Primitive) -> Self {
		Materialized::Primitive(primitive)
	}
}

impl From<Rc<Fiber>> for Materialized {
	fn from(fiber: Rc<Fiber>) -> Self {
		Materialized::Fiber(fiber)
	}
}

/// A materialized host element, possibly produced by a component.
///
/// Fibers produced by a component keep the declaring [`Component`] as their factory,
/// which is what re-renders it with the same props and recognizes it as the same instance on later passes.
pub struct Fiber {
	element: Rc<Element>,
	factory: Option<Rc<Component>>,
	states: Cell<Option<StateRange>>,
	parent: RefCell<Weak<Fiber>>,
	children: RefCell<Vec<Materialized>>,
}

impl Fiber {
	pub(crate) fn host(element: Rc<Element>) -> Self {
		Self {
			element,
			factory: None,
			states: Cell::new(None),
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
		}
	}

	pub(crate) fn instance(element: Rc<Element>, factory: Rc<Component>) -> Self {
		Self {
			factory: Some(factory),
			..Self::host(element)
		}
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		self.element.tag()
	}

	#[must_use]
	pub fn attributes(&self) -> &Attributes {
		self.element.attributes()
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&Value> {
		self.element.attributes().get(name)
	}

	/// The factory's key for component instances, otherwise the element's own.
	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		match &self.factory {
			Some(factory) => factory.key(),
			None => self.element.key(),
		}
	}

	/// The Component-Reference this fiber was instantiated from, if any.
	#[must_use]
	pub fn factory(&self) -> Option<&Rc<Component>> {
		self.factory.as_ref()
	}

	/// The state cells this instance owns exclusively.
	#[must_use]
	pub fn states(&self) -> Option<StateRange> {
		self.states.get()
	}

	pub(crate) fn set_states(&self, states: Option<StateRange>) {
		self.states.set(states)
	}

	pub(crate) fn take_states(&self) -> Option<StateRange> {
		self.states.take()
	}

	#[must_use]
	pub fn parent(&self) -> Option<Rc<Fiber>> {
		self.parent.borrow().upgrade()
	}

	pub(crate) fn parent_link(&self) -> Weak<Fiber> {
		self.parent.borrow().clone()
	}

	pub(crate) fn set_parent(&self, parent: Weak<Fiber>) {
		*self.parent.borrow_mut() = parent
	}

	/// The materialized children.
	///
	/// # Panics
	///
	/// Iff called while the reconciler is splicing a re-rendered child into this fiber.
	#[must_use]
	pub fn children(&self) -> Ref<'_, Vec<Materialized>> {
		self.children.borrow()
	}

	pub(crate) fn children_mut(&self) -> core::cell::RefMut<'_, Vec<Materialized>> {
		self.children.borrow_mut()
	}

	/// Installs `children`, pointing each fiber among them (also inside nested sequences) back at `self`.
	pub(crate) fn set_children(self: &Rc<Self>, children: Vec<Materialized>) {
		let link = Rc::downgrade(self);
		for child in &children {
			child.adopt(&link);
		}
		*self.children.borrow_mut() = children
	}

	pub(crate) fn declared_children(&self) -> &[Node] {
		self.element.children()
	}

	pub(crate) fn element(&self) -> &Rc<Element> {
		&self.element
	}

	/// The handler bound to `event` (i.e. `"click"` finds `onClick`), if any.
	#[must_use]
	pub fn handler(&self, event: &str) -> Option<&EventHandler> {
		self.attributes().iter().find_map(|(name, value)| match value {
			Value::Handler(handler) if name.len() > 2 && name.starts_with("on") && name[2..].eq_ignore_ascii_case(event) => Some(handler),
			_ => None,
		})
	}

	/// Calls the handler bound to `event` with a synthetic event. Returns whether there was one.
	pub fn dispatch(&self, event: &'static str) -> bool {
		match self.handler(event) {
			Some(handler) => {
				handler.clone().call(&Event::synthetic(event));
				true
			}
			None => false,
		}
	}

	/// The nesting depth below the topmost ancestor, counted the way expansion counts it: one per element or sequence level.
	#[must_use]
	pub fn depth(self: &Rc<Self>) -> usize {
		let mut depth = 0;
		let mut current = Rc::clone(self);
		while let Some(parent) = current.parent() {
			let nesting = parent.children().iter().find_map(|child| child.nesting_of(&current)).unwrap_or(0);
			depth += 1 + nesting;
			current = parent;
		}
		depth
	}

	/// The topmost ancestor, or `self` at the root.
	#[must_use]
	pub fn topmost(self: &Rc<Self>) -> Rc<Fiber> {
		let mut current = Rc::clone(self);
		while let Some(parent) = current.parent() {
			current = parent;
		}
		current
	}

	/// The tags and component names from the root down to this fiber, i.e. `App > div > Counter`.
	#[must_use]
	pub fn path(&self) -> String {
		let mut segments = vec![self.label().to_owned()];
		let mut current = self.parent();
		while let Some(fiber) = current {
			segments.push(fiber.label().to_owned());
			current = fiber.parent();
		}
		segments.reverse();
		segments.join(" > ")
	}

	fn label(&self) -> &str {
		match &self.factory {
			Some(factory) => factory.name(),
			None => self.tag(),
		}
	}
}

impl Debug for Fiber {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Fiber");
		debug.field("tag", &self.tag()).field("key", &self.key());
		if let Some(factory) = &self.factory {
			debug.field("factory", &factory.name());
		}
		debug.field("states", &self.states.get());
		match self.children.try_borrow() {
			Ok(children) => debug.field("children", &*children),
			Err(_) => debug.field("children", &"<splicing>"),
		};
		debug.finish()
	}
}
