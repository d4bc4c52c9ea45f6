#![doc(html_root_url = "https://docs.rs/hook-dom/0.0.1")]
#![warn(clippy::pedantic)]
//! A hook-state VDOM reconciler.
//!
//! Component functions receive [`Hooks`], through which they keep local state addressed purely by call order.
//! A [`Reconciler`] expands a declared [`Node`] tree into a [`Materialized`](`fiber::Materialized`) one,
//! diffs it again whenever a [`Setter`] is called and batches the resulting repaints.
//!
//! See the README for an example.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod build;
pub mod context;
pub mod diff;
pub mod error;
pub mod fiber;
pub mod hooks;
mod instantiate;
pub mod node;
pub mod reconciler;
pub mod render;
pub mod scheduler;

pub use context::{RenderConfig, RenderContext};
pub use error::UpdateError;
pub use hooks::{Hooks, Setter};
pub use node::{create_component, create_element, Attributes, Event, EventHandler, Key, Node, Props, Style, Value};
pub use reconciler::Reconciler;
pub use render::{DomRenderer, MarkupRenderer, MarkupTarget, Renderer};
pub use scheduler::{MicrotaskScheduler, QueueScheduler, Scheduler};

/// Renders `root` into the child nodes of `target`, repainting in a microtask after state changes.
///
/// Keep the returned [`Reconciler`] alive for as long as the page should update.
///
/// # Errors
///
/// Iff the first paint fails, see [`Reconciler::render`].
pub fn render(root: impl Into<Node>, target: web_sys::Element) -> Result<Reconciler<DomRenderer>, UpdateError> {
	let reconciler = Reconciler::new(DomRenderer::new(), target, MicrotaskScheduler);
	reconciler.render(root)?;
	Ok(reconciler)
}
