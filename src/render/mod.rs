//! Painting materialized trees onto host surfaces.
//!
//! Attribute conventions shared by all renderers live here:
//!
//! - `className` is painted as `class`.
//! - Empty names, [`Value::Null`] and `false` are skipped.
//! - Handlers under `on…` names are bound to the lowercased event, i.e. `onClick` to `click`.
//! - A [`Style`] under `style` is applied per property. Numbers get a `px` suffix.

use crate::{
	fiber::Materialized,
	node::{format_number, Attributes, EventHandler, Style, Value},
};
use std::borrow::Cow;
use tracing::trace;

mod dom;
mod markup;

pub use dom::DomRenderer;
pub use markup::{MarkupRenderer, MarkupTarget};

/// Paints fully materialized trees. Implemented by the leaf-rendering collaborator.
pub trait Renderer: 'static {
	/// Handle of the surface painted into.
	type Target: 'static;

	/// Empties `target`.
	fn clear(&mut self, target: &Self::Target);

	/// Appends `tree` to `target`.
	///
	/// Painting the same tree into an emptied target must always produce the same output.
	fn paint(&mut self, tree: &Materialized, target: &Self::Target);
}

/// How one attribute is applied to a host element.
#[derive(Debug, Clone)]
pub enum Binding<'a> {
	/// Set directly. `value` is `true`, a number or text.
	Property { name: &'a str, value: &'a Value },
	Listener { event: Cow<'a, str>, handler: &'a EventHandler },
	Style(&'a Style),
}

/// Classifies `attributes` into [`Binding`]s, skipping those that are no-ops.
pub fn bindings(attributes: &Attributes) -> impl Iterator<Item = Binding<'_>> {
	attributes.iter().filter_map(|(name, value)| match (name, value) {
		("", _) | (_, Value::Null) | (_, Value::Bool(false)) => None,
		(name, Value::Handler(handler)) if name.len() > 2 && name.starts_with("on") => Some(Binding::Listener {
			event: Cow::Owned(name[2..].to_ascii_lowercase()),
			handler,
		}),
		("style", Value::Style(style)) => Some(Binding::Style(style)),
		(name, Value::Handler(_)) | (name, Value::Style(_)) => {
			trace!(name, "Skipping attribute value that can't be painted under this name.");
			None
		}
		("className", value) => Some(Binding::Property { name: "class", value }),
		(name, value) => Some(Binding::Property { name, value }),
	})
}

/// The text form of a [`Binding::Property`] value, for surfaces that only take strings.
#[must_use]
pub fn attribute_text(value: &Value) -> Cow<'_, str> {
	match value {
		Value::Text(text) => Cow::Borrowed(&**text),
		Value::Number(number) => Cow::Owned(format_number(*number)),
		Value::Null | Value::Bool(_) | Value::Style(_) | Value::Handler(_) => Cow::Borrowed(""),
	}
}

/// The per-property declarations of `style`, with `px` added to numbers.
pub fn style_declarations(style: &Style) -> impl Iterator<Item = (&str, Cow<'_, str>)> {
	style.iter().filter_map(|(property, value)| match value {
		Value::Number(number) => Some((property, Cow::Owned(format!("{}px", format_number(*number))))),
		Value::Text(text) => Some((property, Cow::Borrowed(&**text))),
		Value::Null | Value::Bool(_) | Value::Style(_) | Value::Handler(_) => None,
	})
}
