//! Devirtualization, reconciliation and view rendering.
//!
//! # Reconciliation
//!
//! [`Renderer::update`] compares the previous and next [`VNode`] for one child slot of a live
//! parent node and applies the difference. Element children are reconciled index by index up to
//! the longer of both child lists; a removed child ([`Outcome::Removed`]) keeps the DOM cursor in
//! place so that the following sibling is not skipped.
//!
//! Attributes are written unconditionally when patching, and removed if absent from the new node.
//!
//! # Views
//!
//! [`Renderer::render`] evaluates a view's template and reconciles the result against the tree the
//! view was last rendered from, in the slot its element currently occupies. Views rendered while
//! another view renders become its children. [`Component::once_created`](`crate::view::Component::once_created`)
//! hooks are deferred until the outermost render returns, then fired innermost first.

use crate::{
	dom::{Dom, NodeKey},
	render_stack::RenderStack,
	view::{View, ViewHandle, CREATE_EVENT},
	vnode::{Element, VNode, DANGEROUS_MARKUP, FORCE_RENDER},
	Error,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	slice,
};
use hashbrown::{HashMap, HashSet};
use serde_json::Value;
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, trace, trace_span, warn};

/// What [`Renderer::update`] did to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// Neither the old nor the new value produce a node.
	Absent,
	/// This many new nodes were inserted.
	Inserted(usize),
	/// The old node(s) were replaced by this many new ones.
	Replaced(usize),
	/// The old node(s) were removed. Subsequent siblings shifted into this slot.
	Removed,
	/// The existing node was updated in place.
	Patched,
	/// A sequence was reconciled item by item into this many nodes.
	Spliced(usize),
}

impl Outcome {
	/// How many DOM nodes the slot occupies afterwards.
	#[must_use]
	pub fn dom_len(self) -> usize {
		match self {
			Outcome::Absent | Outcome::Removed => 0,
			Outcome::Patched => 1,
			Outcome::Inserted(len) | Outcome::Replaced(len) | Outcome::Spliced(len) => len,
		}
	}
}

/// Result of [`Renderer::devirtualize`].
#[derive(Debug, Clone)]
pub enum Devirtualized<N> {
	Node(N),
	/// Produced by sequences. All of these belong into the parent, in order.
	Nodes(Vec<N>),
}

impl<N> Devirtualized<N> {
	#[must_use]
	pub fn into_vec(self) -> Vec<N> {
		match self {
			Devirtualized::Node(node) => vec![node],
			Devirtualized::Nodes(nodes) => nodes,
		}
	}
}

/// Source item and position stamped on an element by [`comp`](`crate::comp::comp`).
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehended {
	pub data: Value,
	pub index: Option<usize>,
}

/// Passed to [`Component::handle`](`crate::view::Component::handle`).
pub struct EventContext<D: Dom> {
	/// The element the directive matched.
	pub element: D::Node,
	/// [`None`] for [`CREATE_EVENT`].
	pub event: Option<D::Event>,
	/// See [`Dom::key_code`].
	pub key_code: Option<u32>,
	/// From the nearest comprehension around (or at) `element`.
	pub data: Option<Value>,
	pub index: Option<usize>,
	origin: Option<D::Node>,
	renderer: Weak<Renderer<D>>,
}

impl<D: Dom> EventContext<D> {
	/// The comprehension enclosing the one [`data`](`EventContext::data`) came from.
	#[must_use]
	pub fn outer(&self) -> Option<Comprehended> {
		self.comprehension(1)
	}

	/// Comprehended data around `element`, `level` steps outwards. Level 0 is [`data`](`EventContext::data`).
	#[must_use]
	pub fn comprehension(&self, level: usize) -> Option<Comprehended> {
		let renderer = self.renderer.upgrade()?;
		let mut found = renderer.find_comprehended(self.origin.as_ref()?)?;
		for _ in 0..level {
			let parent = renderer.dom.parent_node(&found.0)?;
			found = renderer.find_comprehended(&parent)?;
		}
		Some(found.1)
	}
}

impl<D: Dom> Debug for EventContext<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventContext")
			.field("element", &self.element)
			.field("event", &self.event)
			.field("key_code", &self.key_code)
			.field("data", &self.data)
			.field("index", &self.index)
			.finish()
	}
}

/// Renders [`VNode`] trees and [`View`]s into one [`Dom`].
///
/// Always handled through [`Rc`], since observed state and event listeners call back into it.
/// They hold only weak references, so dropping the last [`Rc`] stops all re-rendering and
/// makes remaining listeners no-ops.
pub struct Renderer<D: Dom> {
	dom: D,
	stack: RenderStack<D>,
	pending_created: RefCell<Vec<ViewHandle<D>>>,
	views: RefCell<HashMap<NodeKey, Weak<View<D>>>>,
	comprehended: RefCell<HashMap<NodeKey, Comprehended>>,
	listeners: RefCell<HashMap<NodeKey, Vec<D::ListenerHandle>>>,
	/// Views appearing in each tree currently being reconciled, innermost last.
	retained: RefCell<Vec<HashSet<*const View<D>>>>,
	this: Weak<Self>,
}

impl<D: Dom> Renderer<D> {
	#[must_use]
	pub fn new(dom: D) -> Rc<Self> {
		Self::with_stack(dom, RenderStack::new())
	}

	#[must_use]
	pub fn with_stack(dom: D, stack: RenderStack<D>) -> Rc<Self> {
		Rc::new_cyclic(|this| Self {
			dom,
			stack,
			pending_created: RefCell::new(Vec::new()),
			views: RefCell::new(HashMap::new()),
			comprehended: RefCell::new(HashMap::new()),
			listeners: RefCell::new(HashMap::new()),
			retained: RefCell::new(Vec::new()),
			this: Weak::clone(this),
		})
	}

	#[must_use]
	pub fn dom(&self) -> &D {
		&self.dom
	}

	#[must_use]
	pub fn stack(&self) -> &RenderStack<D> {
		&self.stack
	}

	/// The view whose element `node` currently is.
	#[must_use]
	pub fn view_of(&self, node: &D::Node) -> Option<ViewHandle<D>> {
		self.views.borrow().get(&self.dom.node_key(node)).and_then(Weak::upgrade)
	}

	/// Comprehension data stashed directly on `node`.
	#[must_use]
	pub fn comprehended(&self, node: &D::Node) -> Option<Comprehended> {
		self.comprehended.borrow().get(&self.dom.node_key(node)).cloned()
	}

	/// Builds DOM nodes for `vnode` without looking at any previous tree.
	///
	/// Views are rendered (and become children of the view currently rendering, if any).
	/// Empty children and sequence items produce no nodes.
	pub fn devirtualize(&self, vnode: &VNode<D>) -> Result<Devirtualized<D::Node>, Error> {
		match vnode {
			VNode::Empty => Ok(Devirtualized::Node(self.dom.create_text_node(""))),
			VNode::Text(text) => {
				#[cfg(feature = "dangerous-logging")]
				trace!("Creating text node {:?}", text);
				Ok(Devirtualized::Node(self.dom.create_text_node(text)))
			}
			VNode::Thunk(thunk) => self.devirtualize(&thunk()),
			VNode::Sequence(items) => {
				let mut nodes = Vec::with_capacity(items.len());
				for item in items {
					self.devirtualize_into(item, &mut nodes)?;
				}
				Ok(Devirtualized::Nodes(nodes))
			}
			VNode::View(view) => {
				if let Some(parent) = self.stack.top() {
					if !Rc::ptr_eq(&parent, view) {
						view.set_parent(&parent);
						view.component().attach_to_parent(view, &parent);
					}
				}
				self.render(view).map(Devirtualized::Node)
			}
			VNode::Element(element) => self.create_element(element).map(Devirtualized::Node),
		}
	}

	fn devirtualize_into(&self, vnode: &VNode<D>, nodes: &mut Vec<D::Node>) -> Result<(), Error> {
		match vnode {
			VNode::Empty => Ok(()),
			VNode::Thunk(thunk) => self.devirtualize_into(&thunk(), nodes),
			VNode::Sequence(items) => items.iter().try_for_each(|item| self.devirtualize_into(item, nodes)),
			vnode => {
				nodes.extend(self.devirtualize(vnode)?.into_vec());
				Ok(())
			}
		}
	}

	#[instrument(level = "trace", skip(self, element), fields(tag = %element.tag))]
	fn create_element(&self, element: &Element<D>) -> Result<D::Node, Error> {
		let node = self.dom.create_element(&element.tag)?;
		for (name, value) in &element.attributes {
			match value.as_deref() {
				None => (),
				Some(html) if name == DANGEROUS_MARKUP => self.dom.set_inner_html(&node, html)?,
				Some(_) if name == FORCE_RENDER => (),
				Some(value) => self.dom.set_attribute(&node, name, value)?,
			}
		}
		self.stash(&node, element);

		let mut children = Vec::with_capacity(element.children.len());
		for child in &element.children {
			self.devirtualize_into(child, &mut children)?;
		}
		for child in &children {
			self.dom.append_child(&node, child)?;
		}

		self.hydrate(&node, true)?;
		Ok(node)
	}

	/// Reconciles child slot `index` of `parent` from `old` to `new`.
	///
	/// `new` is normalized in place (see [`VNode::normalize`]) and views that are kept are written
	/// back into it, so it can serve as `old` next time. `old` must be such a previous `new`.
	pub fn update(&self, parent: &D::Node, new: &mut VNode<D>, old: Option<&VNode<D>>, index: usize) -> Result<Outcome, Error> {
		new.normalize();
		self.reconcile_root(parent, new, old, index)
	}

	/// Reconciles a whole tree, remembering which views will still be mounted once it is done.
	fn reconcile_root(&self, parent: &D::Node, new: &mut VNode<D>, old: Option<&VNode<D>>, index: usize) -> Result<Outcome, Error> {
		let mut retained = HashSet::new();
		collect_views(new, &mut retained);
		self.retained.borrow_mut().push(retained);
		let result = self.reconcile(parent, new, old, index);
		self.retained.borrow_mut().pop();
		result
	}

	/// Whether `view` occurs in the tree that is currently being reconciled.
	fn is_retained(&self, view: &ViewHandle<D>) -> bool {
		self.retained.borrow().last().map_or(false, |retained| retained.contains(&Rc::as_ptr(view)))
	}

	fn is_same(&self, a: &D::Node, b: &D::Node) -> bool {
		self.dom.node_key(a) == self.dom.node_key(b)
	}

	fn reconcile(&self, parent: &D::Node, new: &mut VNode<D>, old: Option<&VNode<D>>, index: usize) -> Result<Outcome, Error> {
		let old = match old.filter(|old| !old.is_nothing()) {
			None if new.is_nothing() => return Ok(Outcome::Absent),
			None => {
				let span = trace_span!("Inserting", kind = new.kind(), index);
				let _enter = span.enter();
				let nodes = self.devirtualize(new)?.into_vec();
				return self.insert_nodes(parent, &nodes, index);
			}
			Some(old) => old,
		};

		if new.is_nothing() {
			let span = trace_span!("Removing", kind = old.kind(), index);
			let _enter = span.enter();
			return self.remove(parent, old, index);
		}

		if let VNode::View(old_view) = old {
			return self.update_view(parent, new, old_view, index);
		}

		if diff(old, new) {
			let span = trace_span!("Replacing", old = old.kind(), new = new.kind(), index);
			let _enter = span.enter();
			return self.replace(parent, new, old, index);
		}

		match (old, new) {
			(VNode::Element(old), VNode::Element(new)) => self.patch(parent, new, old, index),
			(VNode::Sequence(old), VNode::Sequence(new)) => {
				let span = trace_span!("Splicing sequence", old_len = old.len(), new_len = new.len(), index);
				let _enter = span.enter();
				self.reconcile_children(parent, new, old, index).map(Outcome::Spliced)
			}
			_ => {
				trace!("Unchanged {} at index {}.", old.kind(), index);
				Ok(Outcome::Patched)
			}
		}
	}

	fn insert_nodes(&self, parent: &D::Node, nodes: &[D::Node], index: usize) -> Result<Outcome, Error> {
		for (offset, node) in nodes.iter().enumerate() {
			let reference = self.dom.child_at(parent, index + offset);
			if reference.as_ref().map_or(false, |reference| self.is_same(reference, node)) {
				trace!("Node is already in place at index {}.", index + offset);
				continue;
			}
			self.dom.insert_before(parent, node, reference.as_ref())?;
		}
		Ok(Outcome::Inserted(nodes.len()))
	}

	fn slot_nodes(&self, parent: &D::Node, old: &VNode<D>, index: usize) -> Vec<D::Node> {
		let len = dom_len(old);
		let nodes: Vec<_> = (index..index + len).filter_map(|i| self.dom.child_at(parent, i)).collect();
		if nodes.len() < len {
			error!("Expected {} DOM node(s) from index {} but found {}.", len, index, nodes.len());
		}
		nodes
	}

	fn remove(&self, parent: &D::Node, old: &VNode<D>, index: usize) -> Result<Outcome, Error> {
		if let VNode::View(view) = old {
			if self.is_retained(view) {
				match (self.dom.child_at(parent, index), view.element()) {
					(Some(slot), Some(element)) if self.is_same(&slot, &element) => {
						trace!("Detaching view that is mounted again elsewhere.");
						self.dom.remove_child(parent, &element)?;
					}
					_ => trace!("View was already moved out of slot {}.", index),
				}
				return Ok(Outcome::Removed);
			}
		}

		let nodes = self.slot_nodes(parent, old, index);
		self.destroy(old, &nodes, &VNode::Empty);
		for node in &nodes {
			self.dom.remove_child(parent, node)?;
			self.forget(node);
		}
		Ok(Outcome::Removed)
	}

	fn replace(&self, parent: &D::Node, new: &VNode<D>, old: &VNode<D>, index: usize) -> Result<Outcome, Error> {
		let nodes = self.devirtualize(new)?.into_vec();
		let old_nodes = self.slot_nodes(parent, old, index);
		if old_nodes.is_empty() {
			error!("Expected to replace a node beyond the end of the parent's children. Switching to insertion.");
			return self.insert_nodes(parent, &nodes, index);
		}
		self.destroy(old, &old_nodes, new);
		self.swap_nodes(parent, &nodes, &old_nodes)?;
		Ok(Outcome::Replaced(nodes.len()))
	}

	fn swap_nodes(&self, parent: &D::Node, nodes: &[D::Node], old_nodes: &[D::Node]) -> Result<(), Error> {
		match (nodes, old_nodes) {
			([node], [old_node]) => {
				self.dom.replace_child(parent, node, old_node)?;
				self.forget(old_node);
			}
			_ => {
				if let Some(first) = old_nodes.first() {
					for node in nodes {
						self.dom.insert_before(parent, node, Some(first))?;
					}
				}
				for old_node in old_nodes {
					self.dom.remove_child(parent, old_node)?;
					self.forget(old_node);
				}
			}
		}
		Ok(())
	}

	fn update_view(&self, parent: &D::Node, new: &mut VNode<D>, old_view: &ViewHandle<D>, index: usize) -> Result<Outcome, Error> {
		if let VNode::View(new_view) = new {
			if Rc::ptr_eq(new_view, old_view) {
				trace!("Same view at index {}. Re-rendering in place.", index);
				self.render(old_view)?;
				return Ok(Outcome::Patched);
			}
		}

		if !old_view.component().has_changed(old_view, new) {
			trace!("View reports no change against {} at index {}. Re-rendering in place.", new.kind(), index);
			self.render(old_view)?;
			*new = VNode::View(Rc::clone(old_view));
			return Ok(Outcome::Patched);
		}

		let span = trace_span!("Replacing view", new = new.kind(), index);
		let _enter = span.enter();

		let retained = self.is_retained(old_view);
		if !retained {
			old_view.component().before_destroyed(old_view, new);
		}
		if let VNode::View(new_view) = new {
			new_view.suppress_created();
		}

		let nodes = self.devirtualize(new)?.into_vec();

		// Rendering `new` may have moved the old view's element away, for example into a new wrapper.
		let slot = self.dom.child_at(parent, index).filter(|slot| !nodes.iter().any(|node| self.is_same(node, slot)));
		let old_node = match (slot, old_view.element()) {
			(Some(slot), Some(element)) if self.is_same(&slot, &element) => slot,
			(_, _) if retained => {
				trace!("View moved out of slot {}. Inserting its replacement.", index);
				return self.insert_nodes(parent, &nodes, index);
			}
			(Some(slot), _) => {
				error!("Expected the replaced view's element at index {}. Replacing the node found there instead.", index);
				slot
			}
			(None, _) => {
				error!("Expected the replaced view's element at index {}. Switching to insertion.", index);
				return self.insert_nodes(parent, &nodes, index);
			}
		};

		if retained {
			trace!("Detaching view that is mounted again later in the tree.");
			match nodes.as_slice() {
				[node] => self.dom.replace_child(parent, node, &old_node)?,
				_ => {
					for node in &nodes {
						self.dom.insert_before(parent, node, Some(&old_node))?;
					}
					self.dom.remove_child(parent, &old_node)?;
				}
			}
		} else {
			if let Some(reference) = old_view.reference() {
				self.destroy(&reference, slice::from_ref(&old_node), &VNode::Empty);
			}
			self.swap_nodes(parent, &nodes, slice::from_ref(&old_node))?;
			old_view.set_element(None);
		}
		Ok(Outcome::Replaced(nodes.len()))
	}

	#[instrument(level = "trace", skip(self, parent, new, old), fields(tag = %new.tag))]
	fn patch(&self, parent: &D::Node, new: &mut Element<D>, old: &Element<D>, index: usize) -> Result<Outcome, Error> {
		let node = match self.dom.child_at(parent, index) {
			Some(node) => node,
			None => {
				error!("Expected <{}> beyond the end of the parent's children. Switching to insertion.", new.tag);
				let node = self.create_element(new)?;
				return self.insert_nodes(parent, slice::from_ref(&node), index);
			}
		};

		for (name, value) in &new.attributes {
			match value.as_deref() {
				None => (),
				Some(html) if name == DANGEROUS_MARKUP => self.dom.set_inner_html(&node, html)?,
				Some(_) if name == FORCE_RENDER => (),
				Some(value) => self.dom.set_attribute(&node, name, value)?,
			}
		}
		for (name, value) in &old.attributes {
			if value.is_none() || new.get_attribute(name).is_some() {
				continue;
			}
			if name == DANGEROUS_MARKUP {
				self.dom.set_inner_html(&node, "")?
			} else if name != FORCE_RENDER {
				self.dom.remove_attribute(&node, name)?
			}
		}
		self.stash(&node, new);

		self.reconcile_children(&node, &mut new.children, &old.children, 0)?;

		self.hydrate(&node, false)?;
		Ok(Outcome::Patched)
	}

	/// Returns the number of DOM nodes now occupied from `start`.
	fn reconcile_children(&self, parent: &D::Node, new: &mut Vec<VNode<D>>, old: &[VNode<D>], start: usize) -> Result<usize, Error> {
		let mut dom_index = start;
		let mut absent = VNode::Empty;
		for i in 0..new.len().max(old.len()) {
			let new_child = match new.get_mut(i) {
				Some(new_child) => new_child,
				None => &mut absent,
			};
			let outcome = self.reconcile(parent, new_child, old.get(i), dom_index)?;
			if outcome == Outcome::Removed {
				trace!("Removed child {}. Retrying at DOM index {}.", i, dom_index);
			}
			dom_index += outcome.dom_len();
		}
		Ok(dom_index - start)
	}

	fn stash(&self, node: &D::Node, element: &Element<D>) {
		let key = self.dom.node_key(node);
		match &element.data {
			Some(data) => {
				self.comprehended.borrow_mut().insert(
					key,
					Comprehended {
						data: data.clone(),
						index: element.index,
					},
				);
			}
			None => {
				self.comprehended.borrow_mut().remove(&key);
			}
		}
	}

	/// Fires [`before_destroyed`](`crate::view::Component::before_destroyed`) for views in `old`
	/// that are still mounted within `removed`.
	fn destroy(&self, old: &VNode<D>, removed: &[D::Node], replacement: &VNode<D>) {
		match old {
			VNode::View(view) => {
				if self.is_retained(view) {
					trace!("Not destroying view that stays in the tree.");
					return;
				}
				let mounted_here = view.element().map_or(false, |element| removed.iter().any(|removed| self.dom.is_within(&element, removed)));
				if !mounted_here {
					trace!("Not destroying view that was mounted elsewhere.");
					return;
				}
				view.component().before_destroyed(view, replacement);
				if let Some(reference) = view.reference() {
					self.destroy(&reference, removed, &VNode::Empty);
				}
			}
			VNode::Element(element) => {
				for child in &element.children {
					self.destroy(child, removed, &VNode::Empty);
				}
			}
			VNode::Sequence(items) => {
				for item in items {
					self.destroy(item, removed, replacement);
				}
			}
			VNode::Empty | VNode::Text(_) | VNode::Thunk(_) => (),
		}
	}

	/// Drops listeners, stashed data and view associations for `node` and its descendants.
	fn forget(&self, node: &D::Node) {
		let key = self.dom.node_key(node);
		let kept = self.views.borrow().get(&key).and_then(Weak::upgrade);
		if let Some(kept) = kept.filter(|kept| self.is_retained(kept)) {
			if kept.element().map_or(false, |element| self.is_same(&element, node)) {
				trace!("Keeping bookkeeping of a view element that is mounted again elsewhere.");
				return;
			}
		}
		let handles = self.listeners.borrow_mut().remove(&key);
		if let Some(handles) = handles {
			trace!("Unbinding {} listener(s) from removed node.", handles.len());
			for handle in handles {
				self.dom.remove_event_listener(node, handle)
			}
		}
		self.comprehended.borrow_mut().remove(&key);
		let view = self.views.borrow_mut().remove(&key).and_then(|view| Weak::upgrade(&view));
		if let Some(view) = view {
			if view.element().map_or(false, |element| self.dom.node_key(&element) == key) {
				view.set_element(None);
			}
		}
		for child in self.dom.child_nodes(node) {
			self.forget(&child)
		}
	}

	/// Binds the directives of the view currently rendering to `element`, replacing earlier bindings.
	fn hydrate(&self, element: &D::Node, was_created: bool) -> Result<(), Error> {
		let key = self.dom.node_key(element);
		let previous = self.listeners.borrow_mut().remove(&key);
		if let Some(previous) = previous {
			trace!("Unbinding {} listener(s) before rehydration.", previous.len());
			for handle in previous {
				self.dom.remove_event_listener(element, handle)
			}
		}

		let view = match self.stack.top() {
			Some(view) => view,
			None => return Ok(()),
		};
		let mut handles = Vec::new();
		let result = self.bind_directives(&view, element, was_created, &mut handles);
		if !handles.is_empty() {
			self.listeners.borrow_mut().insert(key, handles);
		}
		result
	}

	fn bind_directives(&self, view: &ViewHandle<D>, element: &D::Node, was_created: bool, handles: &mut Vec<D::ListenerHandle>) -> Result<(), Error> {
		for directive in view.component().directives() {
			if !self.dom.matches(element, directive.selector)? {
				continue;
			}

			if directive.event == CREATE_EVENT {
				if was_created {
					let span = trace_span!("Inspecting created element", handler = directive.handler);
					let _enter = span.enter();
					let context = self.event_context(element.clone(), None);
					view.component().handle(view, directive.handler, &context)?;
				}
				continue;
			}

			let renderer = Weak::clone(&self.this);
			let weak_view = Rc::downgrade(view);
			let target = element.clone();
			let handler = directive.handler;
			handles.push(self.dom.add_event_listener(
				element,
				directive.event,
				Rc::new(move |event: D::Event| match (renderer.upgrade(), weak_view.upgrade()) {
					(Some(renderer), Some(view)) => renderer.dispatch(&view, handler, target.clone(), event),
					_ => {
						trace!("Ignoring event for a dropped view or renderer.");
						Ok(())
					}
				}),
			)?);
		}
		Ok(())
	}

	fn dispatch(&self, view: &ViewHandle<D>, handler: &str, element: D::Node, event: D::Event) -> Result<(), Error> {
		let span = trace_span!("Dispatching event", handler);
		let _enter = span.enter();
		let context = self.event_context(element, Some(event));
		view.component().handle(view, handler, &context)
	}

	fn event_context(&self, element: D::Node, event: Option<D::Event>) -> EventContext<D> {
		let key_code = event.as_ref().and_then(|event| self.dom.key_code(event));
		let (origin, data, index) = match self.find_comprehended(&element) {
			Some((origin, Comprehended { data, index })) => (Some(origin), Some(data), index),
			None => (None, None, None),
		};
		EventContext {
			element,
			event,
			key_code,
			data,
			index,
			origin,
			renderer: Weak::clone(&self.this),
		}
	}

	/// The nearest node at or above `from` with stashed comprehension data.
	fn find_comprehended(&self, from: &D::Node) -> Option<(D::Node, Comprehended)> {
		let mut current = Some(from.clone());
		while let Some(node) = current {
			let found = self.comprehended.borrow().get(&self.dom.node_key(&node)).cloned();
			if let Some(found) = found {
				return Some((node, found));
			}
			current = self.dom.parent_node(&node);
		}
		None
	}

	/// Renders `view` into the slot it occupies (or a new detached slot) and returns its element.
	///
	/// If this is the outermost render, pending [`once_created`](`crate::view::Component::once_created`)
	/// hooks run before it returns. A failed outermost render discards them instead.
	#[instrument(level = "debug", skip(self, view), fields(name = ?view.component().name(), depth = self.stack.len()))]
	pub fn render(&self, view: &ViewHandle<D>) -> Result<D::Node, Error> {
		let result = self.render_framed(view);
		if self.stack.is_empty() {
			match result {
				Ok(_) => {
					self.flush_created()?;
					debug!("Elements with bound listeners: {}", self.listeners.borrow().len());
				}
				Err(_) => {
					let discarded = self.pending_created.take();
					debug!("Discarding {} pending creation hook(s) after a failed render.", discarded.len());
				}
			}
		}
		result
	}

	fn render_framed(&self, view: &ViewHandle<D>) -> Result<D::Node, Error> {
		let frame = self.stack.push(Rc::clone(view));
		self.pending_created.borrow_mut().push(Rc::clone(view));

		let (parent, index, reference) = match view.element() {
			Some(element) => match self.dom.parent_node(&element) {
				Some(parent) => match self.dom.index_of(&parent, &element) {
					Some(index) => (parent, index, view.reference()),
					None => {
						warn!("View element is missing from its parent's children. Rendering it from scratch.");
						(self.dom.create_fragment(), 0, None)
					}
				},
				None => {
					trace!("View element is detached. Re-rendering it in a fresh fragment.");
					let fragment = self.dom.create_fragment();
					self.dom.append_child(&fragment, &element)?;
					(fragment, 0, view.reference())
				}
			},
			None => (self.dom.create_fragment(), 0, None),
		};

		view.component().process_state(view);
		let mut tree = {
			let data = Value::clone(&view.data());
			view.component().template(&data, view.state())
		};
		tree.normalize();
		let mut tree = single_root(tree)?;

		self.reconcile_root(&parent, &mut tree, reference.as_ref(), index)?;
		view.set_reference(tree);
		self.observe(view);
		drop(frame);

		let element = self.dom.child_at(&parent, index).ok_or(Error::MissingNode { index })?;
		self.views.borrow_mut().insert(self.dom.node_key(&element), Rc::downgrade(view));
		view.set_element(Some(element.clone()));
		Ok(element)
	}

	/// Re-renders `view` whenever its state notifies.
	fn observe(&self, view: &ViewHandle<D>) {
		let renderer = Weak::clone(&self.this);
		let weak_view = Rc::downgrade(view);
		view.state()
			.bind(Rc::new(move || {
				let (renderer, view) = match (renderer.upgrade(), weak_view.upgrade()) {
					(Some(renderer), Some(view)) => (renderer, view),
					_ => return Ok(()),
				};
				if renderer.stack.contains(&view) {
					debug!("Skipping re-entrant render of a view that is already rendering.");
					return Ok(());
				}
				renderer.render(&view).map(drop)
			}))
			.observe();
	}

	fn flush_created(&self) -> Result<(), Error> {
		loop {
			let view = self.pending_created.borrow_mut().pop();
			let view = match view {
				Some(view) => view,
				None => return Ok(()),
			};
			if view.is_created() || view.element().is_none() {
				continue;
			}
			if view.take_created_suppression() {
				trace!("Skipping creation hook of a substituted view for this pass.");
				continue;
			}
			if view.mark_created() {
				let span = trace_span!("once_created", name = ?view.component().name());
				let _enter = span.enter();
				view.component().once_created(&view)?;
			}
		}
	}

	/// One-shot render of a plain tree into a detached fragment, without lifecycle or retained state.
	///
	/// Returns the first produced node.
	pub fn render_tree(&self, mut tree: VNode<D>) -> Result<Option<D::Node>, Error> {
		let fragment = self.dom.create_fragment();
		self.update(&fragment, &mut tree, None, 0)?;
		Ok(self.dom.child_at(&fragment, 0))
	}

	/// Renders `view` and appends its element to `container` unless it is already there.
	pub fn mount(&self, view: &ViewHandle<D>, container: &D::Node) -> Result<D::Node, Error> {
		let element = self.render(view)?;
		let container_key = self.dom.node_key(container);
		let attached = self.dom.parent_node(&element).map_or(false, |parent| self.dom.node_key(&parent) == container_key);
		if !attached {
			self.dom.append_child(container, &element)?;
		}
		Ok(element)
	}
}

impl<D: Dom> Debug for Renderer<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Renderer")
			.field("stack", &self.stack)
			.field("pending_created", &self.pending_created.borrow().len())
			.field("views", &self.views.borrow().len())
			.field("listeners", &self.listeners.borrow().len())
			.finish()
	}
}

/// Whether `new` must replace `old` outright rather than patch it.
///
/// This is shallow: children are not compared.
#[must_use]
pub fn diff<D: Dom>(old: &VNode<D>, new: &VNode<D>) -> bool {
	if !old.same_kind(new) {
		return true;
	}
	match (old, new) {
		(VNode::Text(old), VNode::Text(new)) => old != new,
		(VNode::Element(old), VNode::Element(new)) => old.tag != new.tag || new.forces_render(),
		_ => false,
	}
}

/// Views referenced by `tree` itself, not by the views in it.
fn collect_views<D: Dom>(tree: &VNode<D>, views: &mut HashSet<*const View<D>>) {
	match tree {
		VNode::View(view) => {
			views.insert(Rc::as_ptr(view));
		}
		VNode::Element(element) => {
			for child in &element.children {
				collect_views(child, views)
			}
		}
		VNode::Sequence(items) => {
			for item in items {
				collect_views(item, views)
			}
		}
		VNode::Empty | VNode::Text(_) | VNode::Thunk(_) => (),
	}
}

/// How many DOM nodes a normalized tree occupies in its parent.
fn dom_len<D: Dom>(vnode: &VNode<D>) -> usize {
	match vnode {
		VNode::Empty => 0,
		VNode::Sequence(items) => items.iter().map(dom_len).sum(),
		VNode::Text(_) | VNode::Element(_) | VNode::Thunk(_) | VNode::View(_) => 1,
	}
}

/// Views always own exactly one node.
fn single_root<D: Dom>(tree: VNode<D>) -> Result<VNode<D>, Error> {
	match tree {
		VNode::Empty => Ok(VNode::Text(String::new())),
		VNode::Sequence(items) => {
			let mut items: Vec<_> = items.into_iter().filter(|item| !item.is_nothing()).collect();
			match items.len() {
				0 => Ok(VNode::Text(String::new())),
				1 => Ok(items.remove(0)),
				count => Err(Error::MultipleRoots { count }),
			}
		}
		tree => Ok(tree),
	}
}
