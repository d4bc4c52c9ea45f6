use super::{attribute_text, bindings, style_declarations, Binding, Renderer};
use crate::fiber::Materialized;
use core::{cell::RefCell, fmt::Write as _};
use std::rc::Rc;
use tracing::{instrument, trace};

/// A shared string buffer that [`MarkupRenderer`] paints into. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MarkupTarget(Rc<RefCell<String>>);

impl MarkupTarget {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A copy of the current markup.
	#[must_use]
	pub fn markup(&self) -> String {
		self.0.borrow().clone()
	}
}

/// Paints HTML-like markup. Handlers are left out.
///
/// Keeps count of paints and clears, which makes batching observable.
#[derive(Debug, Default)]
pub struct MarkupRenderer {
	paints: usize,
	clears: usize,
}

impl MarkupRenderer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn paints(&self) -> usize {
		self.paints
	}

	#[must_use]
	pub fn clears(&self) -> usize {
		self.clears
	}
}

impl Renderer for MarkupRenderer {
	type Target = MarkupTarget;

	fn clear(&mut self, target: &MarkupTarget) {
		target.0.borrow_mut().clear();
		self.clears += 1;
	}

	#[instrument(skip_all)]
	fn paint(&mut self, tree: &Materialized, target: &MarkupTarget) {
		let mut markup = target.0.borrow_mut();
		write_node(&mut markup, tree);
		self.paints += 1;
		trace!(paints = self.paints, len = markup.len(), "Painted.");
	}
}

fn write_node(markup: &mut String, node: &Materialized) {
	match node {
		Materialized::Primitive(primitive) => {
			if let Some(text) = primitive.text() {
				escape_into(markup, &text, false)
			}
		}
		Materialized::Sequence(items) => items.iter().for_each(|item| write_node(markup, item)),
		Materialized::Fiber(fiber) => {
			markup.push('<');
			markup.push_str(fiber.tag());
			for binding in bindings(fiber.attributes()) {
				match binding {
					Binding::Property { name, value } => {
						markup.push(' ');
						markup.push_str(name);
						if value.as_bool() != Some(true) {
							markup.push_str("=\"");
							escape_into(markup, &attribute_text(value), true);
							markup.push('"');
						}
					}
					Binding::Style(style) => {
						markup.push_str(" style=\"");
						for (property, value) in style_declarations(style) {
							let mut declaration = String::new();
							// Writing into a `String` can't fail.
							let _ = write!(declaration, "{}: {};", property, value);
							escape_into(markup, &declaration, true);
						}
						markup.push('"');
					}
					Binding::Listener { .. } => (),
				}
			}
			markup.push('>');
			for child in fiber.children().iter() {
				write_node(markup, child)
			}
			markup.push_str("</");
			markup.push_str(fiber.tag());
			markup.push('>');
		}
	}
}

fn escape_into(markup: &mut String, text: &str, quoted: bool) {
	for c in text.chars() {
		match c {
			'&' => markup.push_str("&amp;"),
			'<' => markup.push_str("&lt;"),
			'>' => markup.push_str("&gt;"),
			'"' if quoted => markup.push_str("&quot;"),
			c => markup.push(c),
		}
	}
}
