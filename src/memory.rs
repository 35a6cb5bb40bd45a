//! A headless [`Dom`] that keeps its nodes in an arena and records every mutation.
//!
//! Useful for tests and server-side rendering ([`MemoryDom::to_html`]).

use crate::{
	dom::{Dom, Listener, NodeKey},
	selector::{ElementRef, Selector},
	Error,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter, Write as _},
};
use std::rc::Rc;
use tracing::trace;

/// Shared handle to one in-memory document. Clones refer to the same document.
#[derive(Clone, Default)]
pub struct MemoryDom {
	document: Rc<RefCell<Document>>,
}

/// Index of a node in its [`MemoryDom`]. Nodes are never deallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryListener {
	id: u64,
}

/// A synthetic event, see [`MemoryDom::dispatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEvent {
	pub kind: String,
	pub key_code: Option<u32>,
	pub which: Option<u32>,
	pub char_code: Option<u32>,
}

impl MemoryEvent {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_key_code(self, key_code: u32) -> Self {
		Self {
			key_code: Some(key_code),
			..self
		}
	}

	#[must_use]
	pub fn with_which(self, which: u32) -> Self {
		Self { which: Some(which), ..self }
	}

	#[must_use]
	pub fn with_char_code(self, char_code: u32) -> Self {
		Self {
			char_code: Some(char_code),
			..self
		}
	}
}

/// One recorded change to the document tree. Node creation is not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	Insert { parent: MemoryNode, child: MemoryNode, index: usize },
	Replace { parent: MemoryNode, old: MemoryNode, new: MemoryNode },
	Remove { parent: MemoryNode, child: MemoryNode },
	SetAttribute { element: MemoryNode, name: String, value: String },
	RemoveAttribute { element: MemoryNode, name: String },
	SetInnerHtml { element: MemoryNode, html: String },
	AddListener { target: MemoryNode, event: String },
	RemoveListener { target: MemoryNode, event: String },
}

impl Mutation {
	/// Whether this added, replaced or removed a node.
	#[must_use]
	pub fn is_structural(&self) -> bool {
		matches!(self, Mutation::Insert { .. } | Mutation::Replace { .. } | Mutation::Remove { .. })
	}
}

#[derive(Default)]
struct Document {
	nodes: Vec<NodeData>,
	mutations: Vec<Mutation>,
	next_listener: u64,
}

struct NodeData {
	kind: Kind,
	parent: Option<MemoryNode>,
	children: Vec<MemoryNode>,
	listeners: Vec<(u64, String, Listener<MemoryEvent>)>,
}

enum Kind {
	Element { tag: String, attributes: Vec<(String, String)> },
	Text(String),
	/// Unparsed inner HTML.
	Markup(String),
	Fragment,
}

impl Document {
	fn node(&self, node: MemoryNode) -> &NodeData {
		&self.nodes[node.0]
	}

	fn node_mut(&mut self, node: MemoryNode) -> &mut NodeData {
		&mut self.nodes[node.0]
	}

	fn create(&mut self, kind: Kind) -> MemoryNode {
		self.nodes.push(NodeData {
			kind,
			parent: None,
			children: Vec::new(),
			listeners: Vec::new(),
		});
		MemoryNode(self.nodes.len() - 1)
	}

	fn attributes_mut(&mut self, element: MemoryNode) -> Result<&mut Vec<(String, String)>, Error> {
		match &mut self.node_mut(element).kind {
			Kind::Element { attributes, .. } => Ok(attributes),
			_ => Err(Error::NotAnElement),
		}
	}

	fn position(&self, parent: MemoryNode, child: MemoryNode) -> Result<usize, Error> {
		self.node(parent)
			.children
			.iter()
			.position(|&c| c == child)
			.ok_or_else(|| Error::Dom(format!("{:?} is not a child of {:?}", child, parent)))
	}

	fn is_within(&self, node: MemoryNode, ancestor: MemoryNode) -> bool {
		let mut current = Some(node);
		while let Some(node) = current {
			if node == ancestor {
				return true;
			}
			current = self.node(node).parent;
		}
		false
	}

	fn check_container(&self, parent: MemoryNode, child: MemoryNode) -> Result<(), Error> {
		match self.node(parent).kind {
			Kind::Element { .. } | Kind::Fragment => (),
			Kind::Text(_) | Kind::Markup(_) => return Err(Error::NotAnElement),
		}
		if self.is_within(parent, child) {
			return Err(Error::Dom(format!("Inserting {:?} into {:?} would create a cycle", child, parent)));
		}
		Ok(())
	}

	fn detach(&mut self, child: MemoryNode) {
		if let Some(parent) = self.node_mut(child).parent.take() {
			self.node_mut(parent).children.retain(|&c| c != child);
		}
	}

	/// Moves `child` (or a fragment's children) into `parent` at the position of `reference`.
	fn insert(&mut self, parent: MemoryNode, child: MemoryNode, reference: Option<MemoryNode>) -> Result<(), Error> {
		if let Kind::Fragment = self.node(child).kind {
			for grandchild in self.node(child).children.clone() {
				self.insert(parent, grandchild, reference)?;
			}
			return Ok(());
		}

		self.check_container(parent, child)?;
		self.detach(child);
		let index = match reference {
			Some(reference) => self.position(parent, reference)?,
			None => self.node(parent).children.len(),
		};
		self.node_mut(parent).children.insert(index, child);
		self.node_mut(child).parent = Some(parent);
		self.mutations.push(Mutation::Insert { parent, child, index });
		Ok(())
	}

	fn replace(&mut self, parent: MemoryNode, new: MemoryNode, old: MemoryNode) -> Result<(), Error> {
		self.position(parent, old)?;
		if let Kind::Fragment = self.node(new).kind {
			self.insert(parent, new, Some(old))?;
			return self.remove(parent, old);
		}

		self.check_container(parent, new)?;
		self.detach(new);
		let index = self.position(parent, old)?;
		self.node_mut(parent).children[index] = new;
		self.node_mut(new).parent = Some(parent);
		self.node_mut(old).parent = None;
		self.mutations.push(Mutation::Replace { parent, old, new });
		Ok(())
	}

	fn remove(&mut self, parent: MemoryNode, child: MemoryNode) -> Result<(), Error> {
		let index = self.position(parent, child)?;
		self.node_mut(parent).children.remove(index);
		self.node_mut(child).parent = None;
		self.mutations.push(Mutation::Remove { parent, child });
		Ok(())
	}

	/// The element chain from `node` outwards, for selector matching.
	fn element_chain(&self, node: MemoryNode) -> Vec<ElementRef<'_>> {
		let mut chain = Vec::new();
		let mut current = Some(node);
		while let Some(node) = current {
			let data = self.node(node);
			match &data.kind {
				Kind::Element { tag, attributes } => chain.push(ElementRef { tag, attributes }),
				_ => break,
			}
			current = data.parent;
		}
		chain
	}

	fn write_html(&self, node: MemoryNode, html: &mut String) {
		let data = self.node(node);
		match &data.kind {
			Kind::Element { tag, attributes } => {
				html.push('<');
				html.push_str(tag);
				for (name, value) in attributes {
					// Infallible for `String`.
					let _ = write!(html, " {}=\"{}\"", name, escape(value, true));
				}
				html.push('>');
				for &child in &data.children {
					self.write_html(child, html);
				}
				let _ = write!(html, "</{}>", tag);
			}
			Kind::Text(text) => html.push_str(&escape(text, false)),
			Kind::Markup(markup) => html.push_str(markup),
			Kind::Fragment => {
				for &child in &data.children {
					self.write_html(child, html);
				}
			}
		}
	}

	fn write_text(&self, node: MemoryNode, text: &mut String) {
		let data = self.node(node);
		match &data.kind {
			Kind::Text(content) | Kind::Markup(content) => text.push_str(content),
			Kind::Element { .. } | Kind::Fragment => {
				for &child in &data.children {
					self.write_text(child, text);
				}
			}
		}
	}
}

fn escape(text: &str, attribute: bool) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' if attribute => escaped.push_str("&quot;"),
			c => escaped.push(c),
		}
	}
	escaped
}

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Everything recorded since creation or the last [`MemoryDom::take_mutations`].
	#[must_use]
	pub fn mutations(&self) -> Vec<Mutation> {
		self.document.borrow().mutations.clone()
	}

	pub fn take_mutations(&self) -> Vec<Mutation> {
		std::mem::take(&mut self.document.borrow_mut().mutations)
	}

	/// Lowercase-preserving tag name, [`None`] for non-elements.
	#[must_use]
	pub fn tag_name(&self, node: MemoryNode) -> Option<String> {
		match &self.document.borrow().node(node).kind {
			Kind::Element { tag, .. } => Some(tag.clone()),
			_ => None,
		}
	}

	/// Concatenated text content of `node` and its descendants.
	#[must_use]
	pub fn text(&self, node: MemoryNode) -> String {
		let mut text = String::new();
		self.document.borrow().write_text(node, &mut text);
		text
	}

	#[must_use]
	pub fn attribute(&self, node: MemoryNode, name: &str) -> Option<String> {
		self.attributes(node).into_iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	#[must_use]
	pub fn attributes(&self, node: MemoryNode) -> Vec<(String, String)> {
		match &self.document.borrow().node(node).kind {
			Kind::Element { attributes, .. } => attributes.clone(),
			_ => Vec::new(),
		}
	}

	#[must_use]
	pub fn children(&self, node: MemoryNode) -> Vec<MemoryNode> {
		self.document.borrow().node(node).children.clone()
	}

	#[must_use]
	pub fn listener_count(&self, node: MemoryNode, event: &str) -> usize {
		self.document.borrow().node(node).listeners.iter().filter(|(_, e, _)| e == event).count()
	}

	/// Serializes `node` (a fragment serializes as its children).
	#[must_use]
	pub fn to_html(&self, node: MemoryNode) -> String {
		let mut html = String::new();
		self.document.borrow().write_html(node, &mut html);
		html
	}

	/// Fires `event` on `target`, then bubbles it through its ancestors.
	///
	/// The first listener error stops propagation and is returned.
	pub fn dispatch(&self, target: MemoryNode, event: &MemoryEvent) -> Result<(), Error> {
		let mut path = vec![target];
		while let Some(parent) = self.document.borrow().node(path[path.len() - 1]).parent {
			path.push(parent);
		}
		trace!("Dispatching {:?} along {} node(s).", event.kind, path.len());

		for node in path {
			let listeners: Vec<_> = self
				.document
				.borrow()
				.node(node)
				.listeners
				.iter()
				.filter(|(_, kind, _)| *kind == event.kind)
				.map(|(_, _, listener)| Rc::clone(listener))
				.collect();
			for listener in listeners {
				listener(event.clone())?;
			}
		}
		Ok(())
	}
}

impl Debug for MemoryDom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let document = self.document.borrow();
		f.debug_struct("MemoryDom")
			.field("nodes", &document.nodes.len())
			.field("mutations", &document.mutations.len())
			.finish()
	}
}

impl Dom for MemoryDom {
	type Node = MemoryNode;
	type Event = MemoryEvent;
	type ListenerHandle = MemoryListener;

	fn create_element(&self, tag: &str) -> Result<MemoryNode, Error> {
		if tag.is_empty() || tag.contains(|c: char| c.is_whitespace() || c == '<' || c == '>' || c == '/') {
			return Err(Error::Dom(format!("Invalid tag name {:?}", tag)));
		}
		Ok(self.document.borrow_mut().create(Kind::Element {
			tag: tag.to_owned(),
			attributes: Vec::new(),
		}))
	}

	fn create_text_node(&self, text: &str) -> MemoryNode {
		self.document.borrow_mut().create(Kind::Text(text.to_owned()))
	}

	fn create_fragment(&self) -> MemoryNode {
		self.document.borrow_mut().create(Kind::Fragment)
	}

	fn node_key(&self, node: &MemoryNode) -> NodeKey {
		NodeKey(node.0 as u64)
	}

	fn set_attribute(&self, element: &MemoryNode, name: &str, value: &str) -> Result<(), Error> {
		let mut document = self.document.borrow_mut();
		let attributes = document.attributes_mut(*element)?;
		match attributes.iter_mut().find(|(n, _)| n == name) {
			Some(slot) => value.clone_into(&mut slot.1),
			None => attributes.push((name.to_owned(), value.to_owned())),
		}
		document.mutations.push(Mutation::SetAttribute {
			element: *element,
			name: name.to_owned(),
			value: value.to_owned(),
		});
		Ok(())
	}

	fn remove_attribute(&self, element: &MemoryNode, name: &str) -> Result<(), Error> {
		let mut document = self.document.borrow_mut();
		document.attributes_mut(*element)?.retain(|(n, _)| n != name);
		document.mutations.push(Mutation::RemoveAttribute {
			element: *element,
			name: name.to_owned(),
		});
		Ok(())
	}

	fn set_inner_html(&self, element: &MemoryNode, html: &str) -> Result<(), Error> {
		let mut document = self.document.borrow_mut();
		document.attributes_mut(*element)?;
		for child in std::mem::take(&mut document.node_mut(*element).children) {
			document.node_mut(child).parent = None;
		}
		if !html.is_empty() {
			let markup = document.create(Kind::Markup(html.to_owned()));
			document.node_mut(markup).parent = Some(*element);
			document.node_mut(*element).children.push(markup);
		}
		document.mutations.push(Mutation::SetInnerHtml {
			element: *element,
			html: html.to_owned(),
		});
		Ok(())
	}

	fn insert_before(&self, parent: &MemoryNode, child: &MemoryNode, reference: Option<&MemoryNode>) -> Result<(), Error> {
		self.document.borrow_mut().insert(*parent, *child, reference.copied())
	}

	fn replace_child(&self, parent: &MemoryNode, new: &MemoryNode, old: &MemoryNode) -> Result<(), Error> {
		self.document.borrow_mut().replace(*parent, *new, *old)
	}

	fn remove_child(&self, parent: &MemoryNode, child: &MemoryNode) -> Result<(), Error> {
		self.document.borrow_mut().remove(*parent, *child)
	}

	fn parent_node(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.document.borrow().node(*node).parent
	}

	fn child_nodes(&self, node: &MemoryNode) -> Vec<MemoryNode> {
		self.children(*node)
	}

	fn child_at(&self, parent: &MemoryNode, index: usize) -> Option<MemoryNode> {
		self.document.borrow().node(*parent).children.get(index).copied()
	}

	fn matches(&self, node: &MemoryNode, selector: &str) -> Result<bool, Error> {
		let selector = Selector::parse(selector)?;
		let document = self.document.borrow();
		Ok(selector.matches(&document.element_chain(*node)))
	}

	fn add_event_listener(&self, target: &MemoryNode, event: &str, listener: Listener<MemoryEvent>) -> Result<MemoryListener, Error> {
		let mut document = self.document.borrow_mut();
		let id = document.next_listener;
		document.next_listener += 1;
		document.node_mut(*target).listeners.push((id, event.to_owned(), listener));
		document.mutations.push(Mutation::AddListener {
			target: *target,
			event: event.to_owned(),
		});
		Ok(MemoryListener { id })
	}

	fn remove_event_listener(&self, target: &MemoryNode, handle: MemoryListener) {
		let mut document = self.document.borrow_mut();
		let listeners = &mut document.node_mut(*target).listeners;
		if let Some(position) = listeners.iter().position(|(id, _, _)| *id == handle.id) {
			let (_, event, _) = listeners.remove(position);
			document.mutations.push(Mutation::RemoveListener { target: *target, event });
		}
	}

	fn key_code(&self, event: &MemoryEvent) -> Option<u32> {
		event.key_code.or(event.which).or(event.char_code)
	}

	fn is_within(&self, node: &MemoryNode, ancestor: &MemoryNode) -> bool {
		self.document.borrow().is_within(*node, *ancestor)
	}

	fn index_of(&self, parent: &MemoryNode, child: &MemoryNode) -> Option<usize> {
		self.document.borrow().position(*parent, *child).ok()
	}
}
