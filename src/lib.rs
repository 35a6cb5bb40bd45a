#![doc(html_root_url = "https://docs.rs/canvas-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod comp;
pub mod dom;
mod error;
pub mod memory;
pub mod render_stack;
pub mod renderer;
mod selector;
pub mod state;
pub mod view;
pub mod vnode;
pub mod web;

pub use comp::comp;
pub use error::Error;
pub use renderer::{EventContext, Outcome, Renderer};
pub use state::State;
pub use view::{Component, Directive, View, ViewHandle};
pub use vnode::{Element, VNode};
