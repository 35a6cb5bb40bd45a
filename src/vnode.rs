//! Plain-data description of prospective DOM content.

use crate::{dom::Dom, view::ViewHandle};
use core::{
	fmt::{self, Debug, Formatter},
	mem,
};
use serde_json::{Number, Value};
use std::rc::Rc;

/// Attribute that sets the element's inner HTML directly instead of becoming an attribute.
///
/// Its value is **not** escaped.
pub const DANGEROUS_MARKUP: &str = "dangerous-markup";

/// Attribute that makes reconciliation replace the element instead of patching it.
///
/// It is never written to the DOM.
pub const FORCE_RENDER: &str = "force-render";

/// One renderable value.
///
/// [`VNode::Empty`] renders as an empty text node when devirtualized on its own,
/// but produces no node at all in a child position.
pub enum VNode<D: Dom> {
	Empty,
	Text(String),
	Element(Element<D>),
	/// Lazily produced content, evaluated when the tree is rendered.
	Thunk(Rc<dyn Fn() -> VNode<D>>),
	View(ViewHandle<D>),
	/// Flattened into the surrounding children before use.
	Sequence(Vec<VNode<D>>),
}

/// A prospective DOM element.
pub struct Element<D: Dom> {
	pub tag: String,
	/// Ordered, with unique names. [`None`] values are omitted.
	pub attributes: Vec<(String, Option<String>)>,
	pub children: Vec<VNode<D>>,
	/// Source item, stamped by [`comp`](`crate::comp::comp`).
	pub data: Option<Value>,
	/// Source position, stamped by [`comp`](`crate::comp::comp`).
	pub index: Option<usize>,
}

impl<D: Dom> VNode<D> {
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(text.into())
	}

	pub fn thunk(thunk: impl 'static + Fn() -> VNode<D>) -> Self {
		Self::Thunk(Rc::new(thunk))
	}

	#[must_use]
	pub fn is_nothing(&self) -> bool {
		matches!(self, Self::Empty)
	}

	#[must_use]
	pub fn as_element(&self) -> Option<&Element<D>> {
		match self {
			Self::Element(element) => Some(element),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_view(&self) -> Option<&ViewHandle<D>> {
		match self {
			Self::View(view) => Some(view),
			_ => None,
		}
	}

	/// Whether `self` and `other` are the same variant.
	#[must_use]
	pub fn same_kind(&self, other: &Self) -> bool {
		mem::discriminant(self) == mem::discriminant(other)
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Empty => "empty",
			Self::Text(_) => "text",
			Self::Element(_) => "element",
			Self::Thunk(_) => "thunk",
			Self::View(_) => "view",
			Self::Sequence(_) => "sequence",
		}
	}

	/// Evaluates thunks until `self` is something else.
	pub fn force(&mut self) {
		while let Self::Thunk(thunk) = self {
			let thunk = Rc::clone(thunk);
			*self = thunk();
		}
	}

	/// Forces thunks and flattens sequences throughout the tree, stopping at views.
	///
	/// A top-level sequence stays a sequence, but its items are flat afterwards.
	pub fn normalize(&mut self) {
		self.force();
		match self {
			Self::Element(element) => element.normalize(),
			Self::Sequence(items) => *items = flatten_with(mem::take(items), true),
			Self::Empty | Self::Text(_) | Self::View(_) | Self::Thunk(_) => (),
		}
	}
}

/// Splices nested sequences into one flat list, preserving order.
///
/// Thunks are left alone.
#[must_use]
pub fn flatten<D: Dom>(nodes: Vec<VNode<D>>) -> Vec<VNode<D>> {
	flatten_with(nodes, false)
}

fn flatten_with<D: Dom>(nodes: Vec<VNode<D>>, normalize: bool) -> Vec<VNode<D>> {
	fn flatten_into<D: Dom>(nodes: Vec<VNode<D>>, normalize: bool, flat: &mut Vec<VNode<D>>) {
		for mut node in nodes {
			if normalize {
				node.force();
			}
			match node {
				VNode::Sequence(items) => flatten_into(items, normalize, flat),
				VNode::Element(mut element) if normalize => {
					element.normalize();
					flat.push(VNode::Element(element))
				}
				node => flat.push(node),
			}
		}
	}

	let mut flat = Vec::with_capacity(nodes.len());
	flatten_into(nodes, normalize, &mut flat);
	flat
}

impl<D: Dom> Element<D> {
	pub fn new(tag: impl Into<String>) -> Self {
		Self {
			tag: tag.into(),
			attributes: Vec::new(),
			children: Vec::new(),
			data: None,
			index: None,
		}
	}

	/// Sets an attribute, replacing any previous value of the same name.
	#[must_use]
	pub fn attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.optional_attribute(name, Some(value))
	}

	/// Like [`Element::attribute`], but [`None`] omits the attribute.
	#[must_use]
	pub fn optional_attribute<V: Into<String>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
		let name = name.into();
		let value = value.map(Into::into);
		match self.attributes.iter_mut().find(|(n, _)| *n == name) {
			Some(slot) => slot.1 = value,
			None => self.attributes.push((name, value)),
		}
		self
	}

	/// Sets the inner HTML verbatim. See [`DANGEROUS_MARKUP`].
	#[must_use]
	pub fn dangerous_markup(self, html: impl Into<String>) -> Self {
		self.attribute(DANGEROUS_MARKUP, html)
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<VNode<D>>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children<C: Into<VNode<D>>>(mut self, children: impl IntoIterator<Item = C>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	/// The value of a present (non-[`None`]) attribute.
	#[must_use]
	pub fn get_attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(n, _)| n == name).and_then(|(_, v)| v.as_deref())
	}

	#[must_use]
	pub fn forces_render(&self) -> bool {
		self.get_attribute(FORCE_RENDER).is_some()
	}

	pub fn normalize(&mut self) {
		self.children = flatten_with(mem::take(&mut self.children), true);
	}
}

impl<D: Dom> Clone for VNode<D> {
	fn clone(&self) -> Self {
		match self {
			Self::Empty => Self::Empty,
			Self::Text(text) => Self::Text(text.clone()),
			Self::Element(element) => Self::Element(element.clone()),
			Self::Thunk(thunk) => Self::Thunk(Rc::clone(thunk)),
			Self::View(view) => Self::View(Rc::clone(view)),
			Self::Sequence(items) => Self::Sequence(items.clone()),
		}
	}
}

impl<D: Dom> Clone for Element<D> {
	fn clone(&self) -> Self {
		Self {
			tag: self.tag.clone(),
			attributes: self.attributes.clone(),
			children: self.children.clone(),
			data: self.data.clone(),
			index: self.index,
		}
	}
}

impl<D: Dom> Debug for VNode<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => f.write_str("Empty"),
			Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Self::Element(element) => element.fmt(f),
			Self::Thunk(thunk) => f.debug_tuple("Thunk").field(&Rc::as_ptr(thunk)).finish(),
			Self::View(view) => f.debug_tuple("View").field(&Rc::as_ptr(view)).finish(),
			Self::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
		}
	}
}

impl<D: Dom> Debug for Element<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Element")
			.field("tag", &self.tag)
			.field("attributes", &self.attributes)
			.field("children", &self.children)
			.field("data", &self.data)
			.field("index", &self.index)
			.finish()
	}
}

impl<D: Dom> From<Element<D>> for VNode<D> {
	fn from(element: Element<D>) -> Self {
		Self::Element(element)
	}
}

impl<D: Dom> From<ViewHandle<D>> for VNode<D> {
	fn from(view: ViewHandle<D>) -> Self {
		Self::View(view)
	}
}

impl<D: Dom> From<&ViewHandle<D>> for VNode<D> {
	fn from(view: &ViewHandle<D>) -> Self {
		Self::View(Rc::clone(view))
	}
}

impl<D: Dom> From<Vec<VNode<D>>> for VNode<D> {
	fn from(items: Vec<VNode<D>>) -> Self {
		Self::Sequence(items)
	}
}

impl<D: Dom, T: Into<VNode<D>>> From<Option<T>> for VNode<D> {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Empty, Into::into)
	}
}

impl<D: Dom> From<&str> for VNode<D> {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

impl<D: Dom> From<String> for VNode<D> {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

macro_rules! integer_text {
	($($t:ty),*$(,)?) => {$(
		impl<D: Dom> From<$t> for VNode<D> {
			fn from(value: $t) -> Self {
				Self::Text(value.to_string())
			}
		}
	)*};
}
integer_text!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<D: Dom> From<f64> for VNode<D> {
	fn from(value: f64) -> Self {
		Self::Text(float_text(value))
	}
}

impl<D: Dom> From<Value> for VNode<D> {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Self::Empty,
			Value::Bool(value) => Self::Text(value.to_string()),
			Value::Number(number) => Self::Text(number_text(&number)),
			Value::String(text) => Self::Text(text),
			Value::Array(items) => Self::Sequence(items.into_iter().map(Into::into).collect()),
			object @ Value::Object(_) => Self::Text(object.to_string()),
		}
	}
}

impl<D: Dom> From<&Value> for VNode<D> {
	fn from(value: &Value) -> Self {
		value.clone().into()
	}
}

/// Integral floats print without a fractional part, so `1.0` and `1` render alike.
#[allow(clippy::cast_possible_truncation)]
fn float_text(value: f64) -> String {
	if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
		(value as i64).to_string()
	} else {
		value.to_string()
	}
}

fn number_text(number: &Number) -> String {
	match number.as_f64() {
		Some(value) if number.is_f64() => float_text(value),
		_ => number.to_string(),
	}
}
