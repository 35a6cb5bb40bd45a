//! [`Dom`] implementation for browsers, through [`web_sys`].

use crate::{
	dom::{Dom, Listener, NodeKey},
	Error,
};
use core::{
	cell::Cell,
	convert::TryFrom,
	fmt::{self, Debug, Formatter},
};
use js_sys::Reflect;
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, throw_str, JsCast, JsValue, UnwrapThrowExt};

/// Expando property holding each node's [`NodeKey`].
const KEY_PROPERTY: &str = "__canvas_key__";

/// Drives one [`web_sys::Document`].
///
/// Listener errors are thrown into JavaScript as strings.
pub struct WebDom {
	document: web_sys::Document,
	next_key: Cell<u64>,
}

impl WebDom {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self { document, next_key: Cell::new(1) }
	}

	/// Uses the global `window.document`.
	pub fn from_window() -> Result<Self, Error> {
		let document = web_sys::window()
			.and_then(|window| window.document())
			.ok_or_else(|| Error::Dom("No global `window.document` found.".to_owned()))?;
		Ok(Self::new(document))
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}
}

impl Debug for WebDom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebDom").field("next_key", &self.next_key.get()).finish()
	}
}

/// Keeps the [`Closure`] behind an attached listener alive.
pub struct WebListener {
	event: String,
	closure: Closure<dyn Fn(web_sys::Event)>,
}

impl Debug for WebListener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebListener").field("event", &self.event).finish_non_exhaustive()
	}
}

fn dom_error(error: JsValue) -> Error {
	Error::Dom(format!("{:?}", error))
}

fn element(node: &web_sys::Node) -> Result<&web_sys::Element, Error> {
	node.dyn_ref::<web_sys::Element>().ok_or(Error::NotAnElement)
}

impl Dom for WebDom {
	type Node = web_sys::Node;
	type Event = web_sys::Event;
	type ListenerHandle = WebListener;

	fn create_element(&self, tag: &str) -> Result<web_sys::Node, Error> {
		self.document.create_element(tag).map(Into::into).map_err(dom_error)
	}

	fn create_text_node(&self, text: &str) -> web_sys::Node {
		self.document.create_text_node(text).into()
	}

	fn create_fragment(&self) -> web_sys::Node {
		self.document.create_document_fragment().into()
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
	fn node_key(&self, node: &web_sys::Node) -> NodeKey {
		let property = JsValue::from_str(KEY_PROPERTY);
		if let Some(key) = Reflect::get(node, &property).unwrap_throw().as_f64() {
			return NodeKey(key as u64);
		}
		let key = self.next_key.get();
		self.next_key.set(key + 1);
		Reflect::set(node, &property, &JsValue::from_f64(key as f64)).unwrap_throw();
		NodeKey(key)
	}

	fn set_attribute(&self, node: &web_sys::Node, name: &str, value: &str) -> Result<(), Error> {
		element(node)?.set_attribute(name, value).map_err(dom_error)
	}

	fn remove_attribute(&self, node: &web_sys::Node, name: &str) -> Result<(), Error> {
		element(node)?.remove_attribute(name).map_err(dom_error)
	}

	fn set_inner_html(&self, node: &web_sys::Node, html: &str) -> Result<(), Error> {
		element(node)?.set_inner_html(html);
		Ok(())
	}

	fn insert_before(&self, parent: &web_sys::Node, child: &web_sys::Node, reference: Option<&web_sys::Node>) -> Result<(), Error> {
		parent.insert_before(child, reference).map(drop).map_err(dom_error)
	}

	fn replace_child(&self, parent: &web_sys::Node, new: &web_sys::Node, old: &web_sys::Node) -> Result<(), Error> {
		parent.replace_child(new, old).map(drop).map_err(dom_error)
	}

	fn remove_child(&self, parent: &web_sys::Node, child: &web_sys::Node) -> Result<(), Error> {
		parent.remove_child(child).map(drop).map_err(dom_error)
	}

	fn parent_node(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.parent_node()
	}

	fn child_nodes(&self, node: &web_sys::Node) -> Vec<web_sys::Node> {
		let child_nodes = node.child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.get(i)).collect()
	}

	fn child_at(&self, parent: &web_sys::Node, index: usize) -> Option<web_sys::Node> {
		parent.child_nodes().get(u32::try_from(index).ok()?)
	}

	fn matches(&self, node: &web_sys::Node, selector: &str) -> Result<bool, Error> {
		match node.dyn_ref::<web_sys::Element>() {
			Some(element) => element.matches(selector).map_err(|error| Error::unsupported_selector(selector, format!("{:?}", error))),
			None => Ok(false),
		}
	}

	fn add_event_listener(&self, target: &web_sys::Node, event: &str, listener: Listener<web_sys::Event>) -> Result<WebListener, Error> {
		let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
			if let Err(error) = listener(event) {
				throw_str(&error.to_string())
			}
		}) as Box<dyn Fn(web_sys::Event)>);
		target
			.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
			.map_err(dom_error)?;
		trace!("Added {:?} listener.", event);
		Ok(WebListener {
			event: event.to_owned(),
			closure,
		})
	}

	fn remove_event_listener(&self, target: &web_sys::Node, handle: WebListener) {
		if let Err(error) = target.remove_event_listener_with_callback(&handle.event, handle.closure.as_ref().unchecked_ref()) {
			error!("Failed to remove event listener {:?}: {:?}", handle.event, error)
		}
	}

	fn key_code(&self, event: &web_sys::Event) -> Option<u32> {
		let keyboard_event = event.dyn_ref::<web_sys::KeyboardEvent>();
		let candidates = [
			keyboard_event.map(web_sys::KeyboardEvent::key_code),
			event.dyn_ref::<web_sys::UiEvent>().map(web_sys::UiEvent::which),
			keyboard_event.map(web_sys::KeyboardEvent::char_code),
		];
		candidates.iter().flatten().copied().find(|&code| code != 0)
	}
}
