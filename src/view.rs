//! Stateful render units.
//!
//! A [`View`] pairs a [`Component`] (template, directives and lifecycle hooks) with its
//! [`State`], its data and the bookkeeping the [`Renderer`](`crate::renderer::Renderer`)
//! needs to reconcile it in place. Views are identified by [`Rc`] identity.

use crate::{dom::Dom, renderer::EventContext, state::State, vnode::VNode, Error};
use core::{
	cell::{Cell, Ref, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::rc::{Rc, Weak};
use tracing::{error, trace};

pub type ViewHandle<D> = Rc<View<D>>;

/// Pseudo-event that fires once when a matching element is first created.
pub const CREATE_EVENT: &str = "create";

/// Binds `handler` to `event` on every element of the view matching `selector`.
///
/// `event` is a DOM event name or [`CREATE_EVENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Directive {
	pub selector: &'static str,
	pub event: &'static str,
	pub handler: &'static str,
}

impl Directive {
	#[must_use]
	pub const fn new(selector: &'static str, event: &'static str, handler: &'static str) -> Self {
		Self { selector, event, handler }
	}
}

/// The behaviour of one kind of view.
///
/// Only [`template`](`Component::template`) is required. Any `Fn(&Value, &State) -> VNode<D>` is a component.
pub trait Component<D: Dom>: 'static {
	/// Produces a fresh tree from the view's data and state. Called on every render.
	fn template(&self, data: &Value, state: &State) -> VNode<D>;

	/// Name under which the view registers on its parent, see [`Component::attach_to_parent`].
	fn name(&self) -> Option<&str> {
		None
	}

	fn initial_state(&self) -> Value {
		Value::Object(Map::new())
	}

	fn initial_data(&self) -> Value {
		Value::Object(Map::new())
	}

	/// Consulted whenever an element is created or patched while this view renders.
	fn directives(&self) -> &[Directive] {
		&[]
	}

	/// Runs the handler named by a matching [`Directive`].
	///
	/// Unknown names must be reported as [`Error::UnknownHandler`], which is what the default does.
	fn handle(&self, _view: &ViewHandle<D>, handler: &str, _context: &EventContext<D>) -> Result<(), Error> {
		Err(Error::unknown_handler(handler))
	}

	/// Applies staged configuration right before the template is evaluated.
	fn process_state(&self, _view: &ViewHandle<D>) {}

	/// Fired once after the view is first mounted, once the outermost render has completed.
	fn once_created(&self, _view: &ViewHandle<D>) -> Result<(), Error> {
		Ok(())
	}

	/// Fired right before the view is unmounted or replaced by `replacement`.
	fn before_destroyed(&self, _view: &ViewHandle<D>, _replacement: &VNode<D>) {}

	/// Whether `candidate`, which takes this view's place in its parent's new tree, should replace it.
	///
	/// If this returns `false`, the view is kept and re-rendered in place instead.
	/// The same view instance is never offered as candidate.
	fn has_changed(&self, _view: &ViewHandle<D>, _candidate: &VNode<D>) -> bool {
		true
	}

	fn attach_to_parent(&self, view: &ViewHandle<D>, parent: &ViewHandle<D>) {
		if let Some(name) = self.name() {
			parent.register_child(name, view)
		}
	}
}

impl<D: Dom, F: 'static + Fn(&Value, &State) -> VNode<D>> Component<D> for F {
	fn template(&self, data: &Value, state: &State) -> VNode<D> {
		self(data, state)
	}
}

/// A mounted or mountable view. See the [module documentation](`self`).
pub struct View<D: Dom> {
	component: Box<dyn Component<D>>,
	state: State,
	data: RefCell<Value>,
	element: RefCell<Option<D::Node>>,
	reference: RefCell<Option<VNode<D>>>,
	parent: RefCell<Weak<View<D>>>,
	children: RefCell<HashMap<String, Weak<View<D>>>>,
	created: Cell<bool>,
	suppress_created: Cell<bool>,
}

impl<D: Dom> View<D> {
	pub fn new(component: impl Component<D>) -> ViewHandle<D> {
		let state = State::new(component.initial_state());
		Self::with_state(component, state)
	}

	/// Like [`View::new`], but pins down the closure signature for inference.
	pub fn from_template(template: impl 'static + Fn(&Value, &State) -> VNode<D>) -> ViewHandle<D> {
		Self::new(template)
	}

	/// Creates a view around an existing (possibly shared) [`State`].
	pub fn with_state(component: impl Component<D>, state: State) -> ViewHandle<D> {
		let data = component.initial_data();
		Rc::new(Self {
			component: Box::new(component),
			state,
			data: RefCell::new(data),
			element: RefCell::new(None),
			reference: RefCell::new(None),
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(HashMap::new()),
			created: Cell::new(false),
			suppress_created: Cell::new(false),
		})
	}

	#[must_use]
	pub fn component(&self) -> &dyn Component<D> {
		&*self.component
	}

	#[must_use]
	pub fn state(&self) -> &State {
		&self.state
	}

	#[must_use]
	pub fn data(&self) -> Ref<'_, Value> {
		self.data.borrow()
	}

	/// Replaces the data bag and re-renders the view if it is mounted and observed.
	pub fn set_data(&self, data: Value) -> Result<(), Error> {
		*self.data.borrow_mut() = data;
		self.state.notify()
	}

	/// The node currently occupying this view's slot, if it was rendered.
	#[must_use]
	pub fn element(&self) -> Option<D::Node> {
		self.element.borrow().clone()
	}

	/// The tree the view was last rendered from.
	#[must_use]
	pub fn reference(&self) -> Option<VNode<D>> {
		self.reference.borrow().clone()
	}

	#[must_use]
	pub fn parent(&self) -> Option<ViewHandle<D>> {
		self.parent.borrow().upgrade()
	}

	#[must_use]
	pub fn is_created(&self) -> bool {
		self.created.get()
	}

	pub fn register_child(&self, name: &str, child: &ViewHandle<D>) {
		self.children.borrow_mut().insert(name.to_owned(), Rc::downgrade(child));
	}

	/// A child that registered itself under `name` and is still alive.
	#[must_use]
	pub fn child_view(&self, name: &str) -> Option<ViewHandle<D>> {
		self.children.borrow().get(name).and_then(Weak::upgrade)
	}

	/// Feeds `source` into the view's data: the current data (if any) right away,
	/// then whatever the next fetch completes with.
	///
	/// There is no request generation check, so the last completion to arrive wins.
	pub fn connect(view: &ViewHandle<D>, source: &dyn DataSource) {
		if let Some(data) = source.data() {
			*view.data.borrow_mut() = data;
		}
		let weak = Rc::downgrade(view);
		source.once_fetched(Box::new(move |data| match weak.upgrade() {
			Some(view) => {
				if let Err(error) = view.set_data(data) {
					error!("Failed to re-render view after fetch: {}", error)
				}
			}
			None => trace!("Fetch completed for a dropped view."),
		}));
		source.fetch();
	}

	pub(crate) fn set_parent(&self, parent: &ViewHandle<D>) {
		*self.parent.borrow_mut() = Rc::downgrade(parent);
	}

	pub(crate) fn set_element(&self, element: Option<D::Node>) {
		*self.element.borrow_mut() = element;
	}

	pub(crate) fn set_reference(&self, reference: VNode<D>) {
		*self.reference.borrow_mut() = Some(reference);
	}

	pub(crate) fn mark_created(&self) -> bool {
		!self.created.replace(true)
	}

	pub(crate) fn suppress_created(&self) {
		self.suppress_created.set(true)
	}

	pub(crate) fn take_created_suppression(&self) -> bool {
		self.suppress_created.replace(false)
	}
}

impl<D: Dom> Debug for View<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("View")
			.field("name", &self.component.name())
			.field("state", &self.state)
			.field("element", &self.element.borrow())
			.field("created", &self.created.get())
			.finish()
	}
}

/// Asynchronous data provider backing a view, see [`View::connect`].
pub trait DataSource {
	/// Starts a fetch. Must not block.
	fn fetch(&self);
	/// Registers `callback` to receive the next completed (or recovered) result.
	fn once_fetched(&self, callback: Box<dyn FnOnce(Value)>);
	/// The most recent result, if any.
	fn data(&self) -> Option<Value>;
}
