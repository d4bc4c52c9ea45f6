use super::{attribute_text, bindings, style_declarations, Binding, Renderer};
use crate::{
	fiber::Materialized,
	node::{Event, Value},
};
use tracing::{error, info, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

/// Paints into the child nodes of a [`web_sys::Element`].
///
/// Event listener closures are owned by the renderer and released on [`Renderer::clear`],
/// since every repaint starts from an emptied target.
#[derive(Default)]
pub struct DomRenderer {
	listeners: Vec<Closure<dyn FnMut(web_sys::Event)>>,
}

impl DomRenderer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of event listeners bound by the last paint.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	fn paint_node(&mut self, document: &web_sys::Document, node: &Materialized, parent: &web_sys::Element) {
		match node {
			Materialized::Primitive(primitive) => {
				if let Some(text) = primitive.text() {
					if cfg!(feature = "dangerous-logging") {
						trace!(text = %text, "Creating text node");
					}
					let text = document.create_text_node(&text);
					if let Err(error) = parent.append_child(&text) {
						error!(?error, "Failed to append text node. Skipping it.");
					}
				}
			}

			Materialized::Sequence(items) => {
				for item in items {
					self.paint_node(document, item, parent)
				}
			}

			Materialized::Fiber(fiber) => {
				let element = match document.create_element(fiber.tag()) {
					Ok(element) => element,
					Err(error) => return error!(?error, tag = fiber.tag(), "Failed to create element. Skipping it."),
				};
				for binding in bindings(fiber.attributes()) {
					self.bind(&element, binding)
				}
				for child in fiber.children().iter() {
					self.paint_node(document, child, &element)
				}
				if let Err(error) = parent.append_child(&element) {
					error!(?error, tag = fiber.tag(), "Failed to append element. Skipping it.");
				}
			}
		}
	}

	fn bind(&mut self, element: &web_sys::Element, binding: Binding<'_>) {
		match binding {
			Binding::Property { name, value } => {
				let result = if name == "class" || name.contains('-') {
					element.set_attribute(name, &attribute_text(value))
				} else {
					js_sys::Reflect::set(element, &JsValue::from_str(name), &to_js(value)).map(drop)
				};
				if let Err(error) = result {
					error!(?error, name, "Failed to set property.");
				}
			}

			Binding::Listener { event, handler } => {
				let handler = handler.clone();
				let closure: Closure<dyn FnMut(web_sys::Event)> = Closure::wrap(Box::new(move |event: web_sys::Event| handler.call(&Event::native(event))));
				match element.add_event_listener_with_callback(&event, closure.as_ref().unchecked_ref()) {
					Ok(()) => self.listeners.push(closure),
					Err(error) => error!(?error, event = &*event, "Failed to add event listener."),
				}
			}

			Binding::Style(style) => match element.dyn_ref::<web_sys::HtmlElement>() {
				Some(html_element) => {
					let declaration = html_element.style();
					for (property, value) in style_declarations(style) {
						if let Err(error) = declaration.set_property(property, &value) {
							error!(?error, property, "Failed to set style property.");
						}
					}
				}
				None => warn!(tag = %element.tag_name(), "Styles can only be applied to HTML elements. Skipping them."),
			},
		}
	}
}

fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Bool(value) => JsValue::from_bool(*value),
		Value::Number(number) => JsValue::from_f64(*number),
		Value::Text(text) => JsValue::from_str(text),
		Value::Null | Value::Style(_) | Value::Handler(_) => JsValue::NULL,
	}
}

impl Renderer for DomRenderer {
	type Target = web_sys::Element;

	#[instrument(skip_all)]
	fn clear(&mut self, target: &web_sys::Element) {
		target.set_inner_html("");
		let count = self.listeners.len();
		self.listeners.clear();
		trace!(count, "Released event listeners.");
	}

	#[instrument(skip_all)]
	fn paint(&mut self, tree: &Materialized, target: &web_sys::Element) {
		let document = match target.owner_document() {
			Some(document) => document,
			None => return error!("No owner document found for the render target."),
		};
		self.paint_node(&document, tree, target);
		info!("Event listener count: {}", self.listeners.len());
	}
}

impl core::fmt::Debug for DomRenderer {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("DomRenderer").field("listeners", &self.listeners.len()).finish()
	}
}
