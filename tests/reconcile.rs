use canvas_dom::{
	comp,
	dom::Dom,
	memory::{MemoryDom, MemoryNode, Mutation},
	renderer::diff,
	Outcome, Renderer, VNode,
};
use serde_json::json;

use components_::El;

fn setup() -> (MemoryDom, std::rc::Rc<Renderer<MemoryDom>>, MemoryNode) {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let container = dom.create_element("main").unwrap();
	(dom, renderer, container)
}

/// Structural mutations of `node`'s own child list.
fn structural_under(mutations: Vec<Mutation>, node: MemoryNode) -> Vec<Mutation> {
	mutations
		.into_iter()
		.filter(|mutation| match mutation {
			Mutation::Insert { parent, .. } | Mutation::Replace { parent, .. } | Mutation::Remove { parent, .. } => *parent == node,
			_ => false,
		})
		.collect()
}

fn list(items: &[&str]) -> VNode<MemoryDom> {
	El::new("ul").children(items.iter().map(|item| El::new("li").child(*item))).into()
}

#[test]
fn devirtualize_primitives() {
	let (dom, renderer, _) = setup();

	let empty = renderer.devirtualize(&VNode::Empty).unwrap().into_vec();
	assert_eq!(empty.len(), 1);
	assert_eq!(dom.text(empty[0]), "");

	let number = renderer.devirtualize(&VNode::from(json!(1.0))).unwrap().into_vec();
	assert_eq!(dom.text(number[0]), "1");

	let thunk = renderer.devirtualize(&VNode::thunk(|| El::new("b").child("lazy").into())).unwrap().into_vec();
	assert_eq!(dom.to_html(thunk[0]), "<b>lazy</b>");

	let sequence = renderer
		.devirtualize(&VNode::Sequence(vec!["a".into(), VNode::Empty, VNode::Sequence(vec!["b".into(), "c".into()])]))
		.unwrap()
		.into_vec();
	assert_eq!(sequence.iter().map(|&node| dom.text(node)).collect::<Vec<_>>(), ["a", "b", "c"]);
}

#[test]
fn devirtualize_element() {
	let (dom, renderer, _) = setup();
	let tree: VNode<MemoryDom> = El::new("p")
		.attribute("class", "note")
		.optional_attribute("hidden", None::<String>)
		.attribute("force-render", "")
		.child("Hello, ")
		.child(VNode::Empty)
		.child(vec![VNode::from(El::new("i").child("world")), "!".into()])
		.into();

	let node = renderer.devirtualize(&tree).unwrap().into_vec()[0];
	assert_eq!(dom.to_html(node), r#"<p class="note">Hello, <i>world</i>!</p>"#);
}

#[test]
fn diff_is_shallow() {
	let span: VNode<MemoryDom> = El::new("span").child("a").into();
	let other_span: VNode<MemoryDom> = El::new("span").attribute("id", "x").child("b").into();
	let div: VNode<MemoryDom> = El::new("div").into();
	let forced: VNode<MemoryDom> = El::new("span").attribute("force-render", "true").into();

	assert!(!diff(&span, &other_span));
	assert!(diff(&span, &div));
	assert!(diff(&span, &forced));
	assert!(diff(&span, &"span".into()));
	assert!(!diff(&VNode::<MemoryDom>::from("x"), &"x".into()));
	assert!(diff(&VNode::<MemoryDom>::from("x"), &VNode::from(1)));
	assert!(!diff(&VNode::<MemoryDom>::from(1), &VNode::from(json!(1))));
}

#[test]
fn replace_on_tag_change() {
	let (dom, renderer, container) = setup();
	let mut old: VNode<MemoryDom> = El::new("div").child("content").into();
	assert_eq!(renderer.update(&container, &mut old, None, 0), Ok(Outcome::Inserted(1)));
	let div = dom.children(container)[0];
	dom.take_mutations();

	let mut new: VNode<MemoryDom> = El::new("span").child("content").into();
	assert_eq!(renderer.update(&container, &mut new, Some(&old), 0), Ok(Outcome::Replaced(1)));

	let span = dom.children(container)[0];
	assert_eq!(dom.tag_name(span).as_deref(), Some("span"));
	assert_eq!(
		structural_under(dom.take_mutations(), container),
		[Mutation::Replace {
			parent: container,
			old: div,
			new: span
		}]
	);
}

#[test]
fn attribute_add_remove() {
	let (dom, renderer, container) = setup();
	let mut old: VNode<MemoryDom> = El::new("div").attribute("a", "1").attribute("b", "2").into();
	renderer.update(&container, &mut old, None, 0).unwrap();
	let div = dom.children(container)[0];

	let mut new: VNode<MemoryDom> = El::new("div").attribute("a", "1").attribute("c", "3").into();
	assert_eq!(renderer.update(&container, &mut new, Some(&old), 0), Ok(Outcome::Patched));

	assert_eq!(dom.children(container), [div]);
	assert_eq!(dom.attributes(div), [("a".to_owned(), "1".to_owned()), ("c".to_owned(), "3".to_owned())]);
}

#[test]
fn dangerous_markup() {
	let (dom, renderer, container) = setup();
	let mut old: VNode<MemoryDom> = El::new("div").dangerous_markup("<b>raw</b>").into();
	renderer.update(&container, &mut old, None, 0).unwrap();
	let div = dom.children(container)[0];
	assert_eq!(dom.to_html(div), "<div><b>raw</b></div>");
	assert_eq!(dom.attribute(div, "dangerous-markup"), None);

	let mut new: VNode<MemoryDom> = El::new("div").child("escaped <b>").into();
	renderer.update(&container, &mut new, Some(&old), 0).unwrap();
	assert_eq!(dom.to_html(div), "<div>escaped &lt;b&gt;</div>");
}

#[test]
fn remove_from_middle() {
	let (dom, renderer, container) = setup();
	let mut old = list(&["a", "b", "c", "d"]);
	renderer.update(&container, &mut old, None, 0).unwrap();
	let ul = dom.children(container)[0];
	let first = dom.children(ul)[0];
	let last = dom.children(ul)[3];
	dom.take_mutations();

	let mut new = list(&["a", "c", "d"]);
	assert_eq!(renderer.update(&container, &mut new, Some(&old), 0), Ok(Outcome::Patched));

	assert_eq!(dom.to_html(ul), "<ul><li>a</li><li>c</li><li>d</li></ul>");
	assert_eq!(dom.children(ul)[0], first);
	assert_eq!(structural_under(dom.take_mutations(), ul), [Mutation::Remove { parent: ul, child: last }]);
}

#[test]
fn empty_child_keeps_cursor() {
	let (dom, renderer, container) = setup();
	let item = |text: Option<&str>| -> VNode<MemoryDom> { text.map(|text| El::new("li").child(text)).into() };

	let mut old: VNode<MemoryDom> = El::new("ul").child(item(Some("a"))).child(item(Some("b"))).child(item(Some("c"))).into();
	renderer.update(&container, &mut old, None, 0).unwrap();
	let ul = dom.children(container)[0];
	let c = dom.children(ul)[2];

	let mut gap: VNode<MemoryDom> = El::new("ul").child(item(Some("a"))).child(item(None)).child(item(Some("c"))).into();
	renderer.update(&container, &mut gap, Some(&old), 0).unwrap();
	assert_eq!(dom.to_html(ul), "<ul><li>a</li><li>c</li></ul>");
	assert_eq!(dom.children(ul)[1], c);

	let mut same: VNode<MemoryDom> = El::new("ul").child(item(Some("a"))).child(item(None)).child(item(Some("c"))).into();
	dom.take_mutations();
	renderer.update(&container, &mut same, Some(&gap), 0).unwrap();
	assert!(dom.take_mutations().iter().all(|mutation| !mutation.is_structural()));

	let mut refilled: VNode<MemoryDom> = El::new("ul").child(item(Some("a"))).child(item(Some("b"))).child(item(Some("c"))).into();
	renderer.update(&container, &mut refilled, Some(&same), 0).unwrap();
	assert_eq!(dom.to_html(ul), "<ul><li>a</li><li>b</li><li>c</li></ul>");
	assert_eq!(dom.children(ul)[2], c);
}

#[test]
fn comprehended_children_reconcile() {
	let (dom, renderer, container) = setup();
	let tree = |items: serde_json::Value| -> VNode<MemoryDom> {
		El::new("ol")
			.child(El::new("li").child("header"))
			.child(comp(&items, .., |item, _| Some(El::new("li").child(item).into())))
			.child(El::new("li").child("footer"))
			.into()
	};

	let mut old = tree(json!(["x", "y"]));
	renderer.update(&container, &mut old, None, 0).unwrap();
	let ol = dom.children(container)[0];
	assert_eq!(dom.children(ol).len(), 4);

	let mut new = tree(json!(["x", "y", "z"]));
	renderer.update(&container, &mut new, Some(&old), 0).unwrap();
	assert_eq!(dom.to_html(ol), "<ol><li>header</li><li>x</li><li>y</li><li>z</li><li>footer</li></ol>");

	let y = dom.children(ol)[2];
	assert_eq!(renderer.comprehended(&y).map(|c| (c.data, c.index)), Some((json!("y"), Some(1))));
}

#[test]
fn top_level_sequences_splice() {
	let (dom, renderer, container) = setup();
	let mut old = VNode::Sequence(vec!["a".into(), "b".into()]);
	assert_eq!(renderer.update(&container, &mut old, None, 0), Ok(Outcome::Inserted(2)));

	let mut new = VNode::Sequence(vec!["a".into(), VNode::Sequence(vec!["b".into(), "c".into()])]);
	assert_eq!(renderer.update(&container, &mut new, Some(&old), 0), Ok(Outcome::Spliced(3)));
	assert_eq!(dom.text(container), "abc");

	let mut element: VNode<MemoryDom> = El::new("hr").into();
	assert_eq!(renderer.update(&container, &mut element, Some(&new), 0), Ok(Outcome::Replaced(1)));
	assert_eq!(dom.to_html(container), "<main><hr></hr></main>");

	assert_eq!(renderer.update(&container, &mut VNode::Empty, Some(&element), 0), Ok(Outcome::Removed));
	assert!(dom.children(container).is_empty());
	assert_eq!(renderer.update(&container, &mut VNode::Empty, None, 0), Ok(Outcome::Absent));
}

#[test]
fn recovers_from_missing_nodes() {
	let (dom, renderer, container) = setup();
	let mut old: VNode<MemoryDom> = El::new("p").into();
	renderer.update(&container, &mut old, None, 0).unwrap();
	let p = dom.children(container)[0];
	dom.remove_child(&container, &p).unwrap();

	let mut new: VNode<MemoryDom> = El::new("p").child("back").into();
	assert_eq!(renderer.update(&container, &mut new, Some(&old), 0), Ok(Outcome::Inserted(1)));
	assert_eq!(dom.to_html(container), "<main><p>back</p></main>");
}

#[test]
fn render_tree_is_one_shot() {
	let (dom, renderer, _) = setup();
	let node = renderer.render_tree(El::new("em").child(42).into()).unwrap().unwrap();
	assert_eq!(dom.to_html(node), "<em>42</em>");
	assert_eq!(renderer.render_tree(VNode::Empty).unwrap(), None);
}
