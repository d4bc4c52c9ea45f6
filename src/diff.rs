//! The differ: turns an old materialized tree plus a new declaration into a new materialized tree.
//!
//! Diffing is functional. Old fibers are never mutated apart from having their state range moved out,
//! so a declared subtree that appears at several positions can't alias.

use crate::{
	context::RenderContext,
	fiber::{Fiber, Materialized},
	node::{Component, ComponentId, Key, Node, Primitive},
};
use hashbrown::{hash_map::Entry, HashMap, HashSet};
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span, warn};

/// What kind of node a [`DerivedKey`] was derived from. Nodes of different kinds never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind<'a> {
	Primitive,
	Sequence,
	/// A component instance, by function identity.
	Component(ComponentId),
	/// A plain host element, by tag.
	Host(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPart<'a> {
	/// An explicit `key` attribute or prop.
	Explicit(&'a Key),
	/// The index among siblings, for nodes without an explicit key.
	Position(usize),
}

/// The identity a sibling is matched by across renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedKey<'a> {
	pub kind: KeyKind<'a>,
	pub part: KeyPart<'a>,
}

impl<'a> DerivedKey<'a> {
	fn new(kind: KeyKind<'a>, key: Option<&'a Key>, position: usize) -> Self {
		Self {
			kind,
			part: key.map_or(KeyPart::Position(position), KeyPart::Explicit),
		}
	}

	#[must_use]
	pub fn of_declared(node: &'a Node, position: usize) -> Self {
		match node {
			Node::Primitive(_) => Self::new(KeyKind::Primitive, None, position),
			Node::Sequence(_) => Self::new(KeyKind::Sequence, None, position),
			Node::Component(component) => Self::new(KeyKind::Component(component.identity()), component.key(), position),
			Node::Element(element) => Self::new(KeyKind::Host(element.tag()), element.key(), position),
		}
	}

	#[must_use]
	pub fn of_materialized(node: &'a Materialized, position: usize) -> Self {
		match node {
			Materialized::Primitive(_) => Self::new(KeyKind::Primitive, None, position),
			Materialized::Sequence(_) => Self::new(KeyKind::Sequence, None, position),
			Materialized::Fiber(fiber) => match fiber.factory() {
				Some(factory) => Self::new(KeyKind::Component(factory.identity()), factory.key(), position),
				None => Self::new(KeyKind::Host(fiber.tag()), fiber.key(), position),
			},
		}
	}
}

/// One step of an edit script, walking old and new sequences in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
	/// Both current items are equal. Advances both.
	Same,
	/// The old item is replaced by the new one. Advances both.
	Substitute,
	/// The old item is dropped. Advances old.
	Delete,
	/// The new item is added. Advances new.
	Insert,
}

/// Computes a minimal edit script turning `old` into `new`, with unit costs for substitution, deletion and insertion.
///
/// Ties are broken deterministically towards [`EditOp::Same`], then [`EditOp::Substitute`], then [`EditOp::Delete`], then [`EditOp::Insert`].
#[must_use]
pub fn edit_script<K: PartialEq>(old: &[K], new: &[K]) -> Vec<EditOp> {
	let width = new.len() + 1;
	let mut costs = vec![0_usize; (old.len() + 1) * width];
	for i in 0..=old.len() {
		for j in 0..=new.len() {
			costs[i * width + j] = match (i, j) {
				(0, j) => j,
				(i, 0) => i,
				(i, j) => {
					let diagonal = costs[(i - 1) * width + j - 1];
					let diagonal = if old[i - 1] == new[j - 1] { diagonal } else { diagonal + 1 };
					diagonal.min(costs[(i - 1) * width + j] + 1).min(costs[i * width + j - 1] + 1)
				}
			}
		}
	}

	let mut script = Vec::with_capacity(old.len().max(new.len()));
	let (mut i, mut j) = (old.len(), new.len());
	while i > 0 || j > 0 {
		let cost = costs[i * width + j];
		let op = if i > 0 && j > 0 && old[i - 1] == new[j - 1] && costs[(i - 1) * width + j - 1] == cost {
			EditOp::Same
		} else if i > 0 && j > 0 && costs[(i - 1) * width + j - 1] + 1 == cost {
			EditOp::Substitute
		} else if i > 0 && costs[(i - 1) * width + j] + 1 == cost {
			EditOp::Delete
		} else {
			EditOp::Insert
		};
		match op {
			EditOp::Same | EditOp::Substitute => {
				i -= 1;
				j -= 1;
			}
			EditOp::Delete => i -= 1,
			EditOp::Insert => j -= 1,
		}
		script.push(op);
	}
	script.reverse();
	script
}

impl RenderContext {
	/// Diffs `old` against `new`, reusing component instances (and their state) where identities match
	/// and excising the state of everything in `old` that has no successor.
	///
	/// # Panics
	///
	/// Iff a component function panics. Nothing is committed then: state ranges taken over from `old` go back to their fibers,
	/// state allocated by the diff is freed and nothing in `old` is excised.
	#[instrument(skip_all)]
	pub fn diff(&mut self, old: Option<&Materialized>, new: &Node) -> Materialized {
		self.in_pass(|this| this.diff_at(old, new, 0))
	}

	/// Re-renders `fiber` with the props it last received.
	///
	/// The depth limit applies from [`Fiber::depth`], as if `fiber`'s topmost ancestor were the root.
	///
	/// # Panics
	///
	/// Iff a component function panics, with the same rollback as [`RenderContext::diff`].
	pub fn update(&mut self, fiber: &Rc<Fiber>) -> Materialized {
		self.update_at(fiber, fiber.depth())
	}

	#[instrument(skip_all, fields(tag = fiber.tag(), depth = depth))]
	pub(crate) fn update_at(&mut self, fiber: &Rc<Fiber>, depth: usize) -> Materialized {
		let declared = match fiber.factory() {
			Some(factory) => Node::Component(Rc::clone(factory)),
			None => Node::Element(Rc::clone(fiber.element())),
		};
		let old = Materialized::Fiber(Rc::clone(fiber));
		self.in_pass(|this| this.diff_at(Some(&old), &declared, depth))
	}

	/// Removes the state ranges of `node` and of everything below it from the store.
	pub fn excise(&mut self, node: &Materialized) {
		match node {
			Materialized::Primitive(_) => (),
			Materialized::Sequence(items) => items.iter().for_each(|item| self.excise(item)),
			Materialized::Fiber(fiber) => {
				if let Some(range) = fiber.take_states() {
					let count = self.store.excise(range);
					trace!(count, tag = fiber.tag(), "Excised fiber state.");
				}
				for child in fiber.children().iter() {
					self.excise(child)
				}
			}
		}
	}

	/// Excises `node` once the current pass commits, or right away outside of one.
	fn discard(&mut self, node: &Materialized) {
		if let Some(pass) = &mut self.pass {
			pass.discarded.push(node.clone());
			return;
		}
		self.excise(node)
	}

	pub(crate) fn diff_at(&mut self, old: Option<&Materialized>, new: &Node, depth: usize) -> Materialized {
		if depth > self.config.depth_limit {
			error!(depth, "Depth limit reached. Materializing `null` instead.");
			if let Some(old) = old {
				self.discard(old)
			}
			return Materialized::Primitive(Primitive::Null);
		}

		let old = match old {
			None | Some(Materialized::Primitive(_)) => return self.expand_at(new, depth),
			Some(old) => old,
		};

		match new {
			Node::Primitive(primitive) => {
				self.discard(old);
				Materialized::Primitive(primitive.clone())
			}

			Node::Sequence(items) => match old {
				Materialized::Sequence(old_items) => {
					let span = trace_span!("Diffing sequence", old_len = old_items.len(), new_len = items.len());
					let _enter = span.enter();
					Materialized::Sequence(self.reconcile(old_items, items, depth + 1))
				}
				_ => self.replace(old, new, depth),
			},

			Node::Component(component) => match old.as_fiber() {
				Some(fiber) if fiber.factory().map_or(false, |factory| factory.same_identity(component)) => {
					let span = trace_span!("Diffing component", name = component.name());
					let _enter = span.enter();
					Materialized::Fiber(self.rerender(fiber, component, depth))
				}
				_ => self.replace(old, new, depth),
			},

			Node::Element(element) => match old.as_fiber() {
				// Component-produced fibers are never reused for plain elements.
				Some(fiber) if fiber.factory().is_none() && fiber.tag() == element.tag() => {
					let span = trace_span!("Diffing element", tag = element.tag());
					let _enter = span.enter();
					let next = Rc::new(Fiber::host(Rc::clone(element)));
					self.diff_children(fiber, &next, depth);
					next.set_parent(fiber.parent_link());
					Materialized::Fiber(next)
				}
				_ => self.replace(old, new, depth),
			},
		}
	}

	fn replace(&mut self, old: &Materialized, new: &Node, depth: usize) -> Materialized {
		trace!("Identity changed. Remounting.");
		self.discard(old);
		self.expand_at(new, depth)
	}

	/// Re-instantiates `component` into the state range of `old`, then diffs the children.
	fn rerender(&mut self, old: &Rc<Fiber>, component: &Rc<Component>, depth: usize) -> Rc<Fiber> {
		let next = self.reinstantiate(component, Some(old));
		self.diff_children(old, &next, depth);
		next.set_parent(old.parent_link());
		next
	}

	fn diff_children(&mut self, old: &Rc<Fiber>, next: &Rc<Fiber>, depth: usize) {
		let children = {
			let old_children = old.children();
			self.reconcile(&old_children, next.declared_children(), depth + 1)
		};
		next.set_children(children);
	}

	/// Keyed sibling reconciliation.
	///
	/// An edit script over the derived keys pairs siblings that kept their relative order.
	/// Remaining new siblings are then paired with unmatched old siblings of the same key, which covers moves.
	/// Old siblings left over after that are excised when the pass commits.
	fn reconcile(&mut self, old: &[Materialized], new: &[Node], depth: usize) -> Vec<Materialized> {
		let old_keys: Vec<_> = old.iter().enumerate().map(|(i, node)| DerivedKey::of_materialized(node, i)).collect();
		let new_keys: Vec<_> = new.iter().enumerate().map(|(i, node)| DerivedKey::of_declared(node, i)).collect();

		let mut pairing: Vec<Option<usize>> = vec![None; new.len()];
		let mut used = vec![false; old.len()];
		let (mut i, mut j) = (0, 0);
		for op in edit_script(&old_keys, &new_keys) {
			match op {
				EditOp::Same => {
					pairing[j] = Some(i);
					used[i] = true;
					i += 1;
					j += 1;
				}
				EditOp::Substitute => {
					i += 1;
					j += 1;
				}
				EditOp::Delete => i += 1,
				EditOp::Insert => j += 1,
			}
		}

		let mut seen = HashSet::with_capacity(new_keys.len());
		for key in &new_keys {
			if !seen.insert(key) {
				warn!(?key, "Duplicate key among siblings. Only the first occurrence can keep an instance.");
			}
		}

		let mut pool = HashMap::new();
		for (i, key) in old_keys.iter().enumerate().filter(|(i, _)| !used[*i]) {
			match pool.entry(key) {
				Entry::Vacant(vacant) => {
					vacant.insert(i);
				}
				Entry::Occupied(_) => trace!(?key, "Shadowed duplicate old key."),
			}
		}
		if !pool.is_empty() {
			for (j, key) in new_keys.iter().enumerate() {
				if pairing[j].is_none() {
					if let Some(i) = pool.remove(key) {
						trace!(from = i, to = j, "Moved keyed sibling.");
						pairing[j] = Some(i);
						used[i] = true;
					}
				}
			}
		}

		for (node, _) in old.iter().zip(&used).filter(|(_, used)| !**used) {
			self.discard(node)
		}

		new.iter().zip(pairing).map(|(child, paired)| self.diff_at(paired.map(|i| &old[i]), child, depth)).collect()
	}
}
