//! Declared nodes, as produced by one render call before expansion.
//!
//! Nothing in here has behaviour beyond construction, equality and key extraction.
//! Expanding a [`Node`] into a [`Materialized`](`crate::fiber::Materialized`) tree is the job of [`RenderContext`](`crate::context::RenderContext`).

use crate::hooks::Hooks;
use core::{
	any::{type_name, Any, TypeId},
	fmt::{self, Debug, Formatter},
	iter::FromIterator,
};
use std::{borrow::Cow, rc::Rc};

/// A leaf value. Never owns state.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
	Null,
	Bool(bool),
	Number(f64),
	Text(Rc<str>),
}
impl Primitive {
	/// The text this leaf paints as, or [`None`] for an empty leaf.
	#[must_use]
	pub fn text(&self) -> Option<Cow<'_, str>> {
		match self {
			Primitive::Null | Primitive::Bool(_) => None,
			Primitive::Number(number) => Some(Cow::Owned(format_number(*number))),
			Primitive::Text(text) => Some(Cow::Borrowed(&**text)),
		}
	}
}

/// Formats a number without a trailing `.0` for integral values.
#[must_use]
pub fn format_number(number: f64) -> String {
	if number.is_nan() {
		"NaN".to_owned()
	} else if number.is_infinite() {
		let infinity = if number > 0.0 { "Infinity" } else { "-Infinity" };
		infinity.to_owned()
	} else if number.fract() == 0.0 && number.abs() < 1e15 {
		#[allow(clippy::cast_possible_truncation)]
		let integer = number as i64;
		integer.to_string()
	} else {
		number.to_string()
	}
}

/// A declared node.
///
/// Cloning is cheap: element and component references are shared.
#[derive(Debug, Clone)]
pub enum Node {
	Primitive(Primitive),
	/// Order-significant list of nodes.
	Sequence(Vec<Node>),
	/// Host-Reference: a rendering-primitive tag.
	Element(Rc<Element>),
	/// Component-Reference: a component function plus its props.
	Component(Rc<Component>),
}
impl Node {
	pub const NULL: Node = Node::Primitive(Primitive::Null);

	#[must_use]
	pub fn is_primitive(&self) -> bool {
		matches!(self, Node::Primitive(_))
	}
}
impl Default for Node {
	fn default() -> Self {
		Node::NULL
	}
}

impl From<Primitive> for Node {
	fn from(primitive: Primitive) -> Self {
		Node::Primitive(primitive)
	}
}
impl From<()> for Node {
	fn from((): ()) -> Self {
		Node::NULL
	}
}
impl From<bool> for Node {
	fn from(value: bool) -> Self {
		Node::Primitive(Primitive::Bool(value))
	}
}
impl From<&str> for Node {
	fn from(text: &str) -> Self {
		Node::Primitive(Primitive::Text(text.into()))
	}
}
impl From<String> for Node {
	fn from(text: String) -> Self {
		Node::Primitive(Primitive::Text(text.into()))
	}
}
macro_rules! number_into_node {
	($($ty:ty),*$(,)?) => {$(
		impl From<$ty> for Node {
			#[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
			fn from(number: $ty) -> Self {
				Node::Primitive(Primitive::Number(number as f64))
			}
		}
	)*};
}
number_into_node!(i32, i64, u32, u64, usize, f64);
impl<T: Into<Node>> From<Option<T>> for Node {
	fn from(node: Option<T>) -> Self {
		node.map_or(Node::NULL, Into::into)
	}
}
impl From<Vec<Node>> for Node {
	fn from(nodes: Vec<Node>) -> Self {
		Node::Sequence(nodes)
	}
}
impl<T: Into<Node>> FromIterator<T> for Node {
	fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
		Node::Sequence(iter.into_iter().map(Into::into).collect())
	}
}

/// An explicit identity key, lifted out of the `key` attribute or prop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Int(i64),
	Text(Rc<str>),
}
impl Key {
	/// Interprets an attribute value as key. [`Value::Null`], handlers and styles aren't keys.
	#[must_use]
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
				#[allow(clippy::cast_possible_truncation)]
				let integer = *number as i64;
				Some(Key::Int(integer))
			}
			Value::Number(number) => Some(Key::Text(format_number(*number).into())),
			Value::Bool(value) => Some(Key::Text(value.to_string().into())),
			Value::Text(text) => Some(Key::Text(text.clone())),
			Value::Null | Value::Style(_) | Value::Handler(_) => None,
		}
	}
}
impl From<i64> for Key {
	fn from(key: i64) -> Self {
		Key::Int(key)
	}
}
impl From<i32> for Key {
	fn from(key: i32) -> Self {
		Key::Int(key.into())
	}
}
impl From<&str> for Key {
	fn from(key: &str) -> Self {
		Key::Text(key.into())
	}
}
impl From<String> for Key {
	fn from(key: String) -> Self {
		Key::Text(key.into())
	}
}

/// An event as seen by an [`EventHandler`].
#[derive(Debug, Clone)]
pub struct Event {
	kind: Cow<'static, str>,
	native: Option<web_sys::Event>,
}
impl Event {
	/// An event raised from Rust, without a host event behind it.
	#[must_use]
	pub fn synthetic(kind: impl Into<Cow<'static, str>>) -> Self {
		Self { kind: kind.into(), native: None }
	}

	#[must_use]
	pub fn native(event: web_sys::Event) -> Self {
		Self {
			kind: event.type_().into(),
			native: Some(event),
		}
	}

	/// The lowercase event name, i.e. `"click"`.
	#[must_use]
	pub fn kind(&self) -> &str {
		&self.kind
	}

	#[must_use]
	pub fn as_native(&self) -> Option<&web_sys::Event> {
		self.native.as_ref()
	}
}

/// A shared event callback. Compares by identity.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);
impl EventHandler {
	pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
		Self(Rc::new(handler))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event)
	}
}
impl Debug for EventHandler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("EventHandler").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
	}
}
impl PartialEq for EventHandler {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

/// Per-property style mapping. Number values are painted with a `px` suffix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style(Vec<(Cow<'static, str>, Value)>);
impl Style {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, property: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
		self.0.push((property.into(), value.into()));
		self
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(property, value)| (property.as_ref(), value))
	}
}

/// An attribute or prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Text(Rc<str>),
	Style(Style),
	Handler(EventHandler),
}
impl Value {
	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Value::Text(text) => Some(&**text),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Number(number) => Some(*number),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(value) => Some(*value),
			_ => None,
		}
	}
}
impl From<()> for Value {
	fn from((): ()) -> Self {
		Value::Null
	}
}
impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}
impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Value::Text(text.into())
	}
}
impl From<String> for Value {
	fn from(text: String) -> Self {
		Value::Text(text.into())
	}
}
impl From<Style> for Value {
	fn from(style: Style) -> Self {
		Value::Style(style)
	}
}
impl From<EventHandler> for Value {
	fn from(handler: EventHandler) -> Self {
		Value::Handler(handler)
	}
}
macro_rules! number_into_value {
	($($ty:ty),*$(,)?) => {$(
		impl From<$ty> for Value {
			#[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
			fn from(number: $ty) -> Self {
				Value::Number(number as f64)
			}
		}
	)*};
}
number_into_value!(i32, i64, u32, u64, usize, f64);

/// Insertion-ordered attribute mapping. Setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(Cow<'static, str>, Value)>);
impl Attributes {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
		self.insert(name, value);
		self
	}

	pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) {
		let name = name.into();
		let value = value.into();
		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, slot)) => *slot = value,
			None => self.0.push((name, value)),
		}
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
	}

	pub fn remove(&mut self, name: &str) -> Option<Value> {
		let index = self.0.iter().position(|(existing, _)| existing == name)?;
		Some(self.0.remove(index).1)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(name, value)| (name.as_ref(), value))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Host-Reference: tag, attributes and declared children.
#[derive(Debug, Clone)]
pub struct Element {
	tag: Cow<'static, str>,
	key: Option<Key>,
	attributes: Attributes,
	children: Vec<Node>,
}
impl Element {
	#[must_use]
	pub fn new(tag: impl Into<Cow<'static, str>>, mut attributes: Attributes, children: Vec<Node>) -> Self {
		let key = attributes.remove("key").as_ref().and_then(Key::from_value);
		Self {
			tag: tag.into(),
			key,
			attributes,
			children,
		}
	}

	/// The synthetic grouping container a component result is wrapped in.
	/// A [`Node::Sequence`] becomes its children; anything else its only child.
	pub(crate) fn group(tag: Cow<'static, str>, content: Node) -> Self {
		let children = match content {
			Node::Sequence(items) => items,
			other => vec![other],
		};
		Self {
			tag,
			key: None,
			attributes: Attributes::new(),
			children,
		}
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	#[must_use]
	pub fn attributes(&self) -> &Attributes {
		&self.attributes
	}

	#[must_use]
	pub fn children(&self) -> &[Node] {
		&self.children
	}
}

/// What a component function receives: its attribute-like props and the injected children.
#[derive(Debug, Clone, Default)]
pub struct Props {
	attributes: Attributes,
	children: Vec<Node>,
}
impl Props {
	#[must_use]
	pub fn new(attributes: Attributes, children: Vec<Node>) -> Self {
		Self { attributes, children }
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.attributes.get(name)
	}

	#[must_use]
	pub fn attributes(&self) -> &Attributes {
		&self.attributes
	}

	#[must_use]
	pub fn children(&self) -> &[Node] {
		&self.children
	}

	/// The children as one [`Node::Sequence`], ready to be placed into a result.
	#[must_use]
	pub fn children_node(&self) -> Node {
		Node::Sequence(self.children.clone())
	}
}

type RenderFn = dyn Fn(&Props, &mut Hooks<'_>) -> Node;

/// A component function erased to a pointer. All of these share one type.
pub type RenderFnPtr = fn(&Props, &mut Hooks<'_>) -> Node;

/// What makes two [`Component`]s the same component.
///
/// Each `fn` item and each closure expression has its own type, which is enough to tell them apart.
/// Function pointers and boxed functions share their type with every other one, so for those the function value counts too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId {
	function_type: TypeId,
	address: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Address {
	/// Identical function bodies may be merged by the compiler, in which case they count as one component.
	Function(usize),
	/// Data and vtable pointer. The box is kept alive by its [`Component`], so the address isn't reused while it is compared.
	Boxed(*const RenderFn),
}

impl ComponentId {
	fn of<F: Fn(&Props, &mut Hooks<'_>) -> Node + 'static>(render: &F) -> Self {
		let value: &dyn Any = render;
		let address = if let Some(function) = value.downcast_ref::<RenderFnPtr>() {
			Some(Address::Function(*function as usize))
		} else {
			value.downcast_ref::<Box<RenderFn>>().map(|boxed| Address::Boxed(&**boxed))
		};
		Self {
			function_type: TypeId::of::<F>(),
			address,
		}
	}

	fn name(&self, type_name: &'static str) -> &'static str {
		match self.address {
			Some(Address::Function(_)) => "fn",
			Some(Address::Boxed(_)) => "dyn Fn",
			None => type_name.rsplit("::").next().unwrap_or(type_name),
		}
	}
}

/// Component-Reference: a component function, the props it is called with and an optional key.
///
/// Two references name the same component iff their [`ComponentId`]s are equal.
/// Re-declaring a component from the same `fn` item or closure expression on every render keeps its identity.
pub struct Component {
	render: Rc<RenderFn>,
	identity: ComponentId,
	name: &'static str,
	key: Option<Key>,
	props: Props,
}
impl Component {
	pub fn new<F>(render: F, mut props: Attributes, children: Vec<Node>) -> Self
	where
		F: Fn(&Props, &mut Hooks<'_>) -> Node + 'static,
	{
		let key = props.remove("key").as_ref().and_then(Key::from_value);
		let identity = ComponentId::of(&render);
		Self {
			name: identity.name(type_name::<F>()),
			render: Rc::new(render),
			identity,
			key,
			props: Props::new(props, children),
		}
	}

	#[must_use]
	pub fn identity(&self) -> ComponentId {
		self.identity
	}

	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	#[must_use]
	pub fn props(&self) -> &Props {
		&self.props
	}

	#[must_use]
	pub fn same_identity(&self, other: &Component) -> bool {
		self.identity == other.identity
	}

	pub(crate) fn invoke(&self, hooks: &mut Hooks<'_>) -> Node {
		(self.render)(&self.props, hooks)
	}
}
impl Debug for Component {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component").field("name", &self.name).field("key", &self.key).field("props", &self.props).finish()
	}
}

fn flatten_one_level(children: impl IntoIterator<Item = Node>) -> Vec<Node> {
	let mut flat = Vec::new();
	for child in children {
		match child {
			Node::Sequence(items) => flat.extend(items),
			other => flat.push(other),
		}
	}
	flat
}

/// Declares a host element. `children` is flattened one level; a `key` attribute becomes the element's key.
pub fn create_element(tag: impl Into<Cow<'static, str>>, attributes: Attributes, children: impl IntoIterator<Item = Node>) -> Node {
	Node::Element(Rc::new(Element::new(tag, attributes, flatten_one_level(children))))
}

/// Declares a component instance. `children` is flattened one level and injected as [`Props::children`]; a `key` prop becomes the instance's key.
pub fn create_component<F>(render: F, props: Attributes, children: impl IntoIterator<Item = Node>) -> Node
where
	F: Fn(&Props, &mut Hooks<'_>) -> Node + 'static,
{
	Node::Component(Rc::new(Component::new(render, props, flatten_one_level(children))))
}
