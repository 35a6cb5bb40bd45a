use crate::{dom::Dom, view::ViewHandle};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{error, trace};

/// The views currently being rendered by one [`Renderer`](`crate::renderer::Renderer`), innermost last.
///
/// Entries are only ever removed by dropping the [`Frame`] that added them,
/// so the stack stays balanced when rendering bails out early.
pub struct RenderStack<D: Dom> {
	frames: RefCell<Vec<ViewHandle<D>>>,
}

impl<D: Dom> Default for RenderStack<D> {
	fn default() -> Self {
		Self::new()
	}
}

impl<D: Dom> RenderStack<D> {
	#[must_use]
	pub fn new() -> Self {
		Self { frames: RefCell::new(Vec::new()) }
	}

	#[must_use = "The view is popped again as soon as the `Frame` is dropped."]
	pub fn push(&self, view: ViewHandle<D>) -> Frame<'_, D> {
		self.frames.borrow_mut().push(Rc::clone(&view));
		trace!("Render stack depth: {}", self.len());
		Frame { stack: self, view }
	}

	#[must_use]
	pub fn top(&self) -> Option<ViewHandle<D>> {
		self.frames.borrow().last().cloned()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.frames.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.frames.borrow().is_empty()
	}

	#[must_use]
	pub fn contains(&self, view: &ViewHandle<D>) -> bool {
		self.frames.borrow().iter().any(|frame| Rc::ptr_eq(frame, view))
	}
}

impl<D: Dom> Debug for RenderStack<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderStack").field("len", &self.len()).finish()
	}
}

/// Pops its view off the [`RenderStack`] when dropped.
pub struct Frame<'a, D: Dom> {
	stack: &'a RenderStack<D>,
	view: ViewHandle<D>,
}

impl<'a, D: Dom> Drop for Frame<'a, D> {
	fn drop(&mut self) {
		let popped = self.stack.frames.borrow_mut().pop();
		match popped {
			Some(popped) if Rc::ptr_eq(&popped, &self.view) => (),
			Some(_) => error!("canvas-dom bug: Render stack popped out of order."),
			None => error!("canvas-dom bug: Render stack underflow."),
		}
		trace!("Render stack depth: {}", self.stack.len());
	}
}
