use crate::{
	context::RenderContext,
	fiber::{Fiber, Materialized},
	node::{Node, Primitive},
};
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span};

impl RenderContext {
	/// Expands `node` into a fully materialized tree, instantiating every component with fresh state.
	///
	/// # Panics
	///
	/// Iff a component function panics. State allocated by the expansion is freed first.
	#[instrument(skip_all)]
	pub fn expand(&mut self, node: &Node) -> Materialized {
		self.in_pass(|this| this.expand_at(node, 0))
	}

	pub(crate) fn expand_at(&mut self, node: &Node, depth: usize) -> Materialized {
		if depth > self.config.depth_limit {
			error!(depth, "Depth limit reached. Materializing `null` instead.");
			return Materialized::Primitive(Primitive::Null);
		}

		match node {
			Node::Primitive(primitive) => {
				if cfg!(feature = "dangerous-logging") {
					trace!(?primitive, "Expanding primitive");
				}
				Materialized::Primitive(primitive.clone())
			}

			Node::Sequence(items) => {
				let span = trace_span!("Expanding sequence", len = items.len());
				let _enter = span.enter();
				Materialized::Sequence(items.iter().map(|item| self.expand_at(item, depth + 1)).collect())
			}

			Node::Component(component) => {
				let span = trace_span!("Expanding component", name = component.name());
				let _enter = span.enter();
				let fiber = self.reinstantiate(component, None);
				self.expand_children(&fiber, depth);
				Materialized::Fiber(fiber)
			}

			Node::Element(element) => {
				let span = trace_span!("Expanding element", tag = element.tag());
				let _enter = span.enter();
				let fiber = Rc::new(Fiber::host(Rc::clone(element)));
				self.expand_children(&fiber, depth);
				Materialized::Fiber(fiber)
			}
		}
	}

	fn expand_children(&mut self, fiber: &Rc<Fiber>, depth: usize) {
		let children = fiber.declared_children().iter().map(|child| self.expand_at(child, depth + 1)).collect();
		fiber.set_children(children);
	}
}
