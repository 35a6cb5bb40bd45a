//! The DOM toolkit consumed by the [`Renderer`](`crate::renderer::Renderer`).
//!
//! Implementations are provided for browsers ([`WebDom`](`crate::web::WebDom`))
//! and for headless use ([`MemoryDom`](`crate::memory::MemoryDom`)).

use crate::Error;
use core::fmt::Debug;
use std::rc::Rc;

/// Identity of a live node, stable for as long as the node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

/// Event handler as attached by hydration.
///
/// An `Err` escapes through event dispatch unchanged.
pub type Listener<E> = Rc<dyn Fn(E) -> Result<(), Error>>;

/// Element creation, mutation, event binding and selector matching on platform nodes.
///
/// Indices are always child **node** indices, so text nodes count.
pub trait Dom: 'static {
	type Node: Clone + Debug;
	type Event: Debug;
	/// Keeps an attached listener alive and allows detaching it again.
	type ListenerHandle;

	fn create_element(&self, tag: &str) -> Result<Self::Node, Error>;
	fn create_text_node(&self, text: &str) -> Self::Node;
	fn create_fragment(&self) -> Self::Node;

	fn node_key(&self, node: &Self::Node) -> NodeKey;

	fn set_attribute(&self, element: &Self::Node, name: &str, value: &str) -> Result<(), Error>;
	fn remove_attribute(&self, element: &Self::Node, name: &str) -> Result<(), Error>;
	fn set_inner_html(&self, element: &Self::Node, html: &str) -> Result<(), Error>;

	/// Inserts `child` before `reference`, or appends it if `reference` is [`None`].
	///
	/// Fragments are spliced, i.e. their children are moved instead.
	fn insert_before(&self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>) -> Result<(), Error>;
	fn replace_child(&self, parent: &Self::Node, new: &Self::Node, old: &Self::Node) -> Result<(), Error>;
	fn remove_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<(), Error>;

	fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
	fn child_nodes(&self, node: &Self::Node) -> Vec<Self::Node>;
	fn child_at(&self, parent: &Self::Node, index: usize) -> Option<Self::Node>;

	/// Returns `Ok(false)` for non-element nodes.
	fn matches(&self, node: &Self::Node, selector: &str) -> Result<bool, Error>;

	fn add_event_listener(&self, target: &Self::Node, event: &str, listener: Listener<Self::Event>) -> Result<Self::ListenerHandle, Error>;
	fn remove_event_listener(&self, target: &Self::Node, handle: Self::ListenerHandle);

	/// The legacy key code of a keyboard event: `keyCode`, falling back to `which` and then `charCode`.
	fn key_code(&self, event: &Self::Event) -> Option<u32>;

	fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<(), Error> {
		self.insert_before(parent, child, None)
	}

	/// Position of `child` among `parent`'s child nodes.
	fn index_of(&self, parent: &Self::Node, child: &Self::Node) -> Option<usize> {
		let key = self.node_key(child);
		self.child_nodes(parent).iter().position(|node| self.node_key(node) == key)
	}

	/// Whether `node` is `ancestor` or one of its descendants.
	fn is_within(&self, node: &Self::Node, ancestor: &Self::Node) -> bool {
		let ancestor = self.node_key(ancestor);
		let mut current = Some(node.clone());
		while let Some(node) = current {
			if self.node_key(&node) == ancestor {
				return true;
			}
			current = self.parent_node(&node);
		}
		false
	}
}
