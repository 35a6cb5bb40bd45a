//! List comprehension that remembers where each produced node came from.

use crate::{dom::Dom, vnode::VNode};
use core::ops::{Bound, RangeBounds};
use serde_json::Value;
use std::borrow::Cow;
use tracing::warn;

/// What [`comp`] iterates over.
#[derive(Debug, Clone)]
pub enum Source<'a> {
	Items(Cow<'a, [Value]>),
	/// A virtual range `0..n`, where each item is its own index.
	Count(usize),
}

impl<'a> Source<'a> {
	#[must_use]
	pub fn len(&self) -> usize {
		match self {
			Source::Items(items) => items.len(),
			Source::Count(count) => *count,
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn item(&self, index: usize) -> Value {
		match self {
			Source::Items(items) => items[index].clone(),
			Source::Count(_) => Value::from(index),
		}
	}
}

impl<'a> From<&'a [Value]> for Source<'a> {
	fn from(items: &'a [Value]) -> Self {
		Source::Items(Cow::Borrowed(items))
	}
}

impl<'a> From<&'a Vec<Value>> for Source<'a> {
	fn from(items: &'a Vec<Value>) -> Self {
		Source::Items(Cow::Borrowed(items))
	}
}

impl From<Vec<Value>> for Source<'static> {
	fn from(items: Vec<Value>) -> Self {
		Source::Items(Cow::Owned(items))
	}
}

impl From<usize> for Source<'static> {
	fn from(count: usize) -> Self {
		Source::Count(count)
	}
}

/// Arrays iterate their items, numbers count up to their integer value and `null` is empty.
impl<'a> From<&'a Value> for Source<'a> {
	fn from(value: &'a Value) -> Self {
		match value {
			Value::Array(items) => Source::Items(Cow::Borrowed(items)),
			Value::Number(number) => match number.as_u64() {
				#[allow(clippy::cast_possible_truncation)]
				Some(count) => Source::Count(count as usize),
				None => {
					warn!("Can't comprehend over non-integral or negative number {}; Treating it as empty.", number);
					Source::Count(0)
				}
			},
			Value::Null => Source::Count(0),
			_ => {
				warn!("Can't comprehend over {}; Treating it as empty.", value);
				Source::Count(0)
			}
		}
	}
}

/// Maps `range` of `data` to virtual nodes.
///
/// `callback` is called with each item and its index. [`None`] results are skipped.
/// Resulting [`VNode::Element`]s are stamped with their item and index, which event handlers
/// later recover through [`EventContext`](`crate::renderer::EventContext`).
///
/// The range is clamped to the source. Nested sequences in the results are kept as they are.
pub fn comp<'a, D: Dom>(data: impl Into<Source<'a>>, range: impl RangeBounds<usize>, mut callback: impl FnMut(&Value, usize) -> Option<VNode<D>>) -> Vec<VNode<D>> {
	let source = data.into();
	let len = source.len();
	let start = match range.start_bound() {
		Bound::Included(&start) => start,
		Bound::Excluded(&start) => start.saturating_add(1),
		Bound::Unbounded => 0,
	}
	.min(len);
	let end = match range.end_bound() {
		Bound::Included(&end) => end.saturating_add(1),
		Bound::Excluded(&end) => end,
		Bound::Unbounded => len,
	}
	.min(len);

	let mut produced = Vec::with_capacity(end.saturating_sub(start));
	for index in start..end {
		let item = source.item(index);
		match callback(&item, index) {
			Some(VNode::Element(mut element)) => {
				element.data = Some(item);
				element.index = Some(index);
				produced.push(VNode::Element(element));
			}
			Some(node) => produced.push(node),
			None => (),
		}
	}
	produced
}
