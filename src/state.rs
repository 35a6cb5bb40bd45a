//! Observable property bag that drives view re-renders.
//!
//! Writes made through a [`State`] (or an [`ObservedList`] borrowed from it) invoke the bound
//! callback synchronously, but only after [`State::observe`] has been called at least once.
//! [`State::update`] always notifies exactly once, however many keys it touches.

use crate::Error;
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	ops::{Bound, RangeBounds},
};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{trace, trace_span, warn};

/// Invoked after each observed write.
pub type Callback = Rc<dyn Fn() -> Result<(), Error>>;

/// Shared handle to one property bag. Clones refer to the same bag.
#[derive(Clone, Default)]
pub struct State(Rc<Inner>);

#[derive(Default)]
struct Inner {
	values: RefCell<Map<String, Value>>,
	callback: RefCell<Option<Callback>>,
	observed: Cell<bool>,
}

impl State {
	/// Creates a container from an object.
	///
	/// Anything other than an object or `null` is discarded with a warning.
	#[must_use]
	pub fn new(initial: Value) -> Self {
		let values = match initial {
			Value::Object(values) => values,
			Value::Null => Map::new(),
			other => {
				warn!("Expected an object as initial state but found {}; Starting empty.", kind_of(&other));
				Map::new()
			}
		};
		Self(Rc::new(Inner {
			values: RefCell::new(values),
			callback: RefCell::new(None),
			observed: Cell::new(false),
		}))
	}

	/// Replaces the callback. Only one callback is active at a time.
	pub fn bind(&self, callback: Callback) -> &Self {
		*self.0.callback.borrow_mut() = Some(callback);
		self
	}

	/// Enables notifications. Idempotent.
	pub fn observe(&self) -> &Self {
		if !self.0.observed.replace(true) {
			trace!("State is now observed.");
		}
		self
	}

	#[must_use]
	pub fn is_observed(&self) -> bool {
		self.0.observed.get()
	}

	/// Invokes the bound callback if observed.
	///
	/// No borrow of the container is held during the call, so the callback may read and write freely.
	pub fn notify(&self) -> Result<(), Error> {
		if !self.is_observed() {
			return Ok(());
		}
		let callback = self.0.callback.borrow().clone();
		match callback {
			Some(callback) => {
				let span = trace_span!("State callback");
				let _enter = span.enter();
				callback()
			}
			None => Ok(()),
		}
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<Value> {
		self.0.values.borrow().get(key).cloned()
	}

	/// Looks up a nested value, e.g. `&["form", "email"]`.
	#[must_use]
	pub fn get_in(&self, path: &[&str]) -> Option<Value> {
		let values = self.0.values.borrow();
		let (first, rest) = path.split_first()?;
		let mut current = values.get(*first)?;
		for key in rest {
			current = current.as_object()?.get(*key)?;
		}
		Some(current.clone())
	}

	/// Runs `f` with read access to all values.
	pub fn with<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
		f(&self.0.values.borrow())
	}

	/// A copy of all values as one object.
	#[must_use]
	pub fn snapshot(&self) -> Value {
		Value::Object(self.0.values.borrow().clone())
	}

	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.0.values.borrow_mut().insert(key.to_owned(), value.into());
		self.notify()
	}

	/// Writes a nested value, creating (or overwriting non-object) intermediate levels as objects.
	///
	/// An empty `path` is ignored.
	pub fn set_in(&self, path: &[&str], value: impl Into<Value>) -> Result<(), Error> {
		let (last, parents) = match path.split_last() {
			Some(split) => split,
			None => return Ok(()),
		};
		{
			let mut values = self.0.values.borrow_mut();
			let mut current = &mut *values;
			for key in parents {
				let slot = current.entry((*key).to_owned()).or_insert_with(|| Value::Object(Map::new()));
				if !slot.is_object() {
					*slot = Value::Object(Map::new());
				}
				current = match slot {
					Value::Object(map) => map,
					_ => unreachable!(),
				};
			}
			current.insert((*last).to_owned(), value.into());
		}
		self.notify()
	}

	pub fn remove(&self, key: &str) -> Result<Option<Value>, Error> {
		let removed = self.0.values.borrow_mut().remove(key);
		self.notify()?;
		Ok(removed)
	}

	/// Deep-merges `partial` into the container, observes it and then notifies once.
	///
	/// Objects merge key by key when both sides are objects. Everything else overwrites.
	/// A non-object `partial` is ignored apart from the notification.
	pub fn update(&self, partial: Value) -> Result<(), Error> {
		{
			let span = trace_span!("Merging state update");
			let _enter = span.enter();
			match partial {
				Value::Object(partial) => merge(&mut self.0.values.borrow_mut(), partial),
				other => warn!("Expected an object as state update but found {}; Ignoring it.", kind_of(&other)),
			}
		}
		self.observe();
		self.notify()
	}

	/// Borrows the array stored under `key` as an observed list.
	///
	/// Returns [`None`] if there is no array under `key`.
	#[must_use]
	pub fn list(&self, key: &str) -> Option<ObservedList<'_>> {
		if self.0.values.borrow().get(key).map_or(false, Value::is_array) {
			Some(ObservedList { state: self, key: key.to_owned() })
		} else {
			None
		}
	}

	fn with_array<R>(&self, key: &str, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
		let mut values = self.0.values.borrow_mut();
		let slot = values.entry(key.to_owned()).or_insert_with(|| Value::Array(Vec::new()));
		if !slot.is_array() {
			warn!("Observed list {:?} was overwritten with {}; Resetting it to an empty array.", key, kind_of(slot));
			*slot = Value::Array(Vec::new());
		}
		match slot {
			Value::Array(items) => f(items),
			_ => unreachable!(),
		}
	}
}

/// Merges `partial` into `target` recursively.
pub fn merge(target: &mut Map<String, Value>, partial: Map<String, Value>) {
	for (key, incoming) in partial {
		let overwrite = match (target.get_mut(&key), incoming) {
			(Some(Value::Object(current)), Value::Object(incoming)) => {
				merge(current, incoming);
				None
			}
			(_, incoming) => Some(incoming),
		};
		if let Some(incoming) = overwrite {
			target.insert(key, incoming);
		}
	}
}

fn kind_of(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

impl Debug for State {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("State")
			.field("values", &self.0.values.borrow())
			.field("bound", &self.0.callback.borrow().is_some())
			.field("observed", &self.0.observed.get())
			.finish()
	}
}

/// Array mutations on one key of a [`State`], each notifying like a direct write.
#[derive(Debug)]
pub struct ObservedList<'a> {
	state: &'a State,
	key: String,
}

impl<'a> ObservedList<'a> {
	#[must_use]
	pub fn len(&self) -> usize {
		self.state.with_array(&self.key, |items| items.len())
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn get(&self, index: usize) -> Option<Value> {
		self.state.with_array(&self.key, |items| items.get(index).cloned())
	}

	pub fn push(&self, value: impl Into<Value>) -> Result<(), Error> {
		let value = value.into();
		self.state.with_array(&self.key, move |items| items.push(value));
		self.state.notify()
	}

	pub fn pop(&self) -> Result<Option<Value>, Error> {
		let popped = self.state.with_array(&self.key, Vec::pop);
		self.state.notify()?;
		Ok(popped)
	}

	/// Overwrites the item at `index`. Out of range indices are ignored with a warning.
	pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), Error> {
		let value = value.into();
		let written = self.state.with_array(&self.key, move |items| match items.get_mut(index) {
			Some(slot) => {
				*slot = value;
				true
			}
			None => false,
		});
		if !written {
			warn!("Observed list index {} is out of range; Ignoring the write.", index);
			return Ok(());
		}
		self.state.notify()
	}

	/// Removes `range` (clamped to the list) and inserts `items` in its place,
	/// returning what was removed.
	pub fn splice(&self, range: impl RangeBounds<usize>, items: impl IntoIterator<Item = Value>) -> Result<Vec<Value>, Error> {
		let start = match range.start_bound() {
			Bound::Included(&start) => start,
			Bound::Excluded(&start) => start.saturating_add(1),
			Bound::Unbounded => 0,
		};
		let end = match range.end_bound() {
			Bound::Included(&end) => Some(end.saturating_add(1)),
			Bound::Excluded(&end) => Some(end),
			Bound::Unbounded => None,
		};
		let items: Vec<Value> = items.into_iter().collect();
		let removed = self.state.with_array(&self.key, move |list| {
			let len = list.len();
			let start = start.min(len);
			let end = end.unwrap_or(len).min(len).max(start);
			list.splice(start..end, items).collect::<Vec<_>>()
		});
		self.state.notify()?;
		Ok(removed)
	}
}
