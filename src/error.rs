use core::fmt::{self, Display, Formatter};

/// Failures surfaced by rendering, hydration and event dispatch.
///
/// Structural bookkeeping during reconciliation (a child being removed) is **not** an error,
/// see [`Outcome::Removed`](`crate::renderer::Outcome::Removed`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	/// A directive selector uses syntax the DOM toolkit can't match.
	UnsupportedSelector { selector: String, reason: String },
	/// A directive names a handler that its [`Component`](`crate::view::Component`) doesn't handle.
	UnknownHandler { handler: String },
	/// An element-only operation was attempted on a text node or fragment.
	NotAnElement,
	/// A view template resolved to more than one root node.
	MultipleRoots { count: usize },
	/// The slot a view was rendered into turned out to be empty.
	MissingNode { index: usize },
	/// The platform DOM rejected an operation.
	Dom(String),
}

impl Error {
	pub fn unknown_handler(handler: &str) -> Self {
		Self::UnknownHandler { handler: handler.to_owned() }
	}

	pub(crate) fn unsupported_selector(selector: &str, reason: impl Into<String>) -> Self {
		Self::UnsupportedSelector {
			selector: selector.to_owned(),
			reason: reason.into(),
		}
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Error::UnsupportedSelector { selector, reason } => write!(f, "Unsupported selector {:?}: {}", selector, reason),
			Error::UnknownHandler { handler } => write!(f, "Unknown directive handler {:?}", handler),
			Error::NotAnElement => write!(f, "Expected an element node"),
			Error::MultipleRoots { count } => write!(f, "View template resolved to {} root nodes; expected one", count),
			Error::MissingNode { index } => write!(f, "Expected a DOM node at child index {}", index),
			Error::Dom(message) => write!(f, "DOM operation failed: {}", message),
		}
	}
}

impl std::error::Error for Error {}
