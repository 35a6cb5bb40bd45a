use canvas_dom::{
	dom::Dom,
	memory::{Mutation, MemoryDom},
	render_stack::RenderStack,
	view::DataSource,
	Error, Renderer, State, VNode, View, ViewHandle,
};
use serde_json::{json, Value};
use std::{cell::RefCell, rc::Rc};

use components_::{count, El, Journal, Probe};

#[test]
fn counter_reuses_its_element() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let view = View::from_template(|_, state| El::new("span").child(count(state, "count")).into());
	view.state().set("count", 0).unwrap();

	let span = renderer.render(&view).unwrap();
	assert_eq!(dom.to_html(span), "<span>0</span>");
	assert!(view.state().is_observed());

	view.state().set("count", 1).unwrap();
	assert_eq!(dom.to_html(span), "<span>1</span>");
	assert_eq!(view.element(), Some(span));
	assert_eq!(renderer.view_of(&span).map(|v| Rc::ptr_eq(&v, &view)), Some(true));
}

#[test]
fn unobserved_writes_do_not_render() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let renders = Rc::new(RefCell::new(0));
	let view = View::from_template({
		let renders = Rc::clone(&renders);
		move |_, _| {
			*renders.borrow_mut() += 1;
			VNode::from("static")
		}
	});

	view.state().set("ignored", true).unwrap();
	assert_eq!(*renders.borrow(), 0);

	renderer.render(&view).unwrap();
	view.state().set("noticed", true).unwrap();
	assert_eq!(*renders.borrow(), 2);
	drop(renderer);

	view.state().set("after drop", true).unwrap();
	assert_eq!(*renders.borrow(), 2);
}

#[test]
fn idempotent_rerender() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let view = View::from_template(|data, _| {
		El::new("section")
			.attribute("class", "card")
			.child(El::new("h1").child(&data["title"]))
			.child(El::new("p").child("body"))
			.into()
	});
	view.set_data(json!({ "title": "Hello" })).unwrap();

	let section = renderer.render(&view).unwrap();
	let before = dom.to_html(section);
	dom.take_mutations();

	renderer.render(&view).unwrap();
	assert_eq!(dom.to_html(section), before);
	assert!(dom.take_mutations().iter().all(|mutation| !mutation.is_structural()));
}

#[test]
fn created_hooks_fire_innermost_first_after_outer_render() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let first = View::new(Probe::new("first", &journal, |_, _| El::new("i").into()));
	let second = View::new(Probe::new("second", &journal, |_, _| El::new("b").into()));
	let outer = View::new(Probe::new("outer", &journal, {
		let (first, second, journal) = (Rc::clone(&first), Rc::clone(&second), journal.clone());
		move |_, _| {
			journal.log("template outer");
			El::new("div").child(&first).child(&second).into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	assert_eq!(dom.to_html(div), "<div><i></i><b></b></div>");
	assert_eq!(journal.take(), ["template outer", "created second", "created first", "created outer"]);
	assert!(renderer.stack().is_empty());

	assert!(Rc::ptr_eq(&first.parent().unwrap(), &outer));
	assert!(Rc::ptr_eq(&outer.child_view("second").unwrap(), &second));

	renderer.render(&outer).unwrap();
	assert_eq!(journal.take(), ["template outer"]);
	assert_eq!(dom.children(div), [first.element().unwrap(), second.element().unwrap()]);
}

#[test]
fn replaced_views_are_destroyed() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let nested = View::new(Probe::new("nested", &journal, |_, _| El::new("em").into()));
	let child = View::new(Probe::new("child", &journal, {
		let nested = Rc::clone(&nested);
		move |_, _| El::new("p").child(&nested).into()
	}));
	let outer = View::new(Probe::new("outer", &journal, {
		let child = Rc::clone(&child);
		move |_, state| {
			if count(state, "step") == 0 {
				El::new("div").child(&child).into()
			} else {
				El::new("div").child("gone").into()
			}
		}
	}));

	let div = renderer.render(&outer).unwrap();
	journal.take();

	outer.state().set("step", 1).unwrap();
	assert_eq!(dom.to_html(div), "<div>gone</div>");
	assert_eq!(journal.take(), ["destroyed child for text", "destroyed nested for empty"]);
	assert_eq!(child.element(), None);
	assert_eq!(nested.element(), None);
}

#[test]
fn removed_subtrees_destroy_nested_views() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let item = View::new(Probe::new("item", &journal, |_, _| El::new("li").into()));
	let outer = View::new(Probe::new("outer", &journal, {
		let item = Rc::clone(&item);
		move |_, state| {
			let list = El::new("ul").child(&item);
			let list = if count(state, "step") == 0 { list } else { list.attribute("force-render", "") };
			El::new("div").child(list).child(El::new("hr")).into()
		}
	}));

	renderer.render(&outer).unwrap();
	journal.take();

	// The same instance is re-mounted by the replacement, so it survives.
	outer.state().set("step", 1).unwrap();
	assert_eq!(journal.take(), Vec::<String>::new());
	assert!(item.element().is_some());
}

#[test]
fn substituted_views_skip_creation_once() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let outer = View::new(Probe::new("outer", &journal, {
		let journal = journal.clone();
		move |_, state| {
			let name = if count(state, "generation") == 0 { "old" } else { "new" };
			El::new("div").child(View::new(Probe::new(name, &journal, |_, _| El::new("span").into()))).into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	assert_eq!(journal.take(), ["created old", "created outer"]);

	outer.state().set("generation", 1).unwrap();
	assert_eq!(journal.take(), ["destroyed old for view"]);
	assert_eq!(dom.to_html(div), "<div><span></span></div>");
}

#[test]
fn unchanged_views_are_kept() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let outer = View::new(Probe::new("outer", &journal, {
		let journal = journal.clone();
		move |_, state| {
			let label = count(state, "label");
			El::new("div")
				.child(View::new(Probe::new("sticky", &journal, |_, _| El::new("span").into()).keep()))
				.child(label)
				.into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	let sticky = dom.children(div)[0];
	let sticky_view = renderer.view_of(&sticky).unwrap();
	journal.take();

	outer.state().set("label", 7).unwrap();
	assert_eq!(dom.to_html(div), "<div><span></span>7</div>");
	assert_eq!(dom.children(div)[0], sticky);
	assert!(Rc::ptr_eq(&renderer.view_of(&sticky).unwrap(), &sticky_view));
	assert_eq!(journal.take(), Vec::<String>::new());
}

fn labelled(name: &'static str, journal: &Journal) -> ViewHandle<MemoryDom> {
	View::new(Probe::new(name, journal, move |_, _| El::new("b").child(name).into()))
}

#[test]
fn reordered_views_keep_their_elements() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let a = labelled("A", &journal);
	let b = labelled("B", &journal);
	let outer = View::new(Probe::new("outer", &journal, {
		let (a, b) = (Rc::clone(&a), Rc::clone(&b));
		move |_, state| {
			let (x, y) = if count(state, "swapped") == 0 { (&a, &b) } else { (&b, &a) };
			El::new("div").child(x).child(y).into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	let (a_element, b_element) = (a.element().unwrap(), b.element().unwrap());
	journal.take();

	outer.state().set("swapped", 1).unwrap();
	assert_eq!(dom.to_html(div), "<div><b>B</b><b>A</b></div>");
	assert_eq!(dom.children(div), [b_element, a_element]);
	assert_eq!((a.element(), b.element()), (Some(a_element), Some(b_element)));
	assert!(Rc::ptr_eq(&renderer.view_of(&a_element).unwrap(), &a));
	assert_eq!(journal.take(), Vec::<String>::new());

	outer.state().set("swapped", 0).unwrap();
	assert_eq!(dom.to_html(div), "<div><b>A</b><b>B</b></div>");
	assert_eq!(dom.children(div), [a_element, b_element]);
	assert_eq!(journal.take(), Vec::<String>::new());
}

#[test]
fn wrapped_views_move_into_the_wrapper() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let a = labelled("A", &journal);
	let outer = View::new(Probe::new("outer", &journal, {
		let a = Rc::clone(&a);
		move |_, state| {
			if count(state, "wrap") == 0 {
				El::new("div").child(&a).into()
			} else {
				El::new("div").child(El::new("i").child(&a)).into()
			}
		}
	}));

	let div = renderer.render(&outer).unwrap();
	let a_element = a.element().unwrap();
	journal.take();

	outer.state().set("wrap", 1).unwrap();
	assert_eq!(dom.to_html(div), "<div><i><b>A</b></i></div>");
	assert_eq!(a.element(), Some(a_element));
	assert_eq!(dom.parent_node(&a_element), dom.children(div).first().copied());

	outer.state().set("wrap", 0).unwrap();
	assert_eq!(dom.to_html(div), "<div><b>A</b></div>");
	assert_eq!(dom.children(div), [a_element]);
	assert_eq!(journal.take(), Vec::<String>::new());
}

#[test]
fn views_move_between_sibling_subtrees() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let a = labelled("A", &journal);
	let outer = View::new(Probe::new("outer", &journal, {
		let a = Rc::clone(&a);
		move |_, state| {
			let right = count(state, "right") != 0;
			El::new("div")
				.child(El::new("section").child(if right { None } else { Some(&a) }))
				.child(El::new("section").child(if right { Some(&a) } else { None }))
				.into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	let a_element = a.element().unwrap();
	journal.take();

	outer.state().set("right", 1).unwrap();
	assert_eq!(dom.to_html(div), "<div><section></section><section><b>A</b></section></div>");
	assert_eq!(a.element(), Some(a_element));
	assert_eq!(journal.take(), Vec::<String>::new());

	// The back reference survives the move.
	assert!(Rc::ptr_eq(&renderer.view_of(&a_element).unwrap(), &a));
	outer.state().set("right", 0).unwrap();
	assert_eq!(dom.to_html(div), "<div><section><b>A</b></section><section></section></div>");
}

#[test]
fn dropping_a_leading_view_shifts_the_rest() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let journal = Journal::default();

	let views = [labelled("A", &journal), labelled("B", &journal), labelled("C", &journal)];
	let outer = View::new(Probe::new("outer", &journal, {
		let views = views.clone();
		move |_, state| {
			let skip = count(state, "skip") as usize;
			El::new("div").children(views.iter().skip(skip)).into()
		}
	}));

	let div = renderer.render(&outer).unwrap();
	let elements: Vec<_> = views.iter().map(|view| view.element().unwrap()).collect();
	journal.take();

	outer.state().set("skip", 1).unwrap();
	assert_eq!(dom.to_html(div), "<div><b>B</b><b>C</b></div>");
	assert_eq!(dom.children(div), elements[1..].to_vec());
	assert_eq!(journal.take(), ["destroyed A for view"]);
	assert_eq!(views[0].element(), None);
}

#[test]
fn self_writes_do_not_recurse() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let view = View::from_template(|_, state| {
		let renders = count(state, "renders") + 1;
		state.set("renders", renders).unwrap();
		VNode::from(renders)
	});

	let text = renderer.render(&view).unwrap();
	assert_eq!(dom.text(text), "1");
	let text = renderer.render(&view).unwrap();
	assert_eq!(dom.text(text), "2");
	assert_eq!(count(view.state(), "renders"), 2);
}

#[test]
fn state_updates_notify_once() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let renders = Rc::new(RefCell::new(0));
	let view = View::with_state(
		{
			let renders = Rc::clone(&renders);
			move |_: &Value, state: &State| {
				*renders.borrow_mut() += 1;
				VNode::<MemoryDom>::from(format!("{}", state.snapshot()))
			}
		},
		State::new(json!({ "form": { "email": "", "name": "" } })),
	);

	renderer.render(&view).unwrap();
	view.state().update(json!({ "form": { "email": "a@b.c" }, "valid": true })).unwrap();
	assert_eq!(*renders.borrow(), 2);
	assert_eq!(view.state().get_in(&["form", "name"]), Some(json!("")));

	assert!(view.state().list("items").is_none());
	view.state().set("items", json!([])).unwrap();
	view.state().list("items").unwrap().push(1).unwrap();
	assert_eq!(*renders.borrow(), 4);
}

#[test]
fn render_errors_keep_the_stack_balanced() {
	let dom = MemoryDom::new();
	let stack = RenderStack::new();
	let renderer = Renderer::with_stack(dom.clone(), stack);
	let journal = Journal::default();

	let broken = View::new(Probe::new("broken", &journal, |_, _| VNode::Sequence(vec![El::new("a").into(), El::new("b").into()])));
	let outer = View::new(Probe::new("outer", &journal, {
		let broken = Rc::clone(&broken);
		move |_, _| El::new("div").child(&broken).into()
	}));

	assert_eq!(renderer.render(&outer), Err(Error::MultipleRoots { count: 2 }));
	assert!(renderer.stack().is_empty());

	let fine = View::from_template(|_, _| VNode::Sequence(vec![VNode::Empty, "only".into()]));
	let text = renderer.render(&fine).unwrap();
	assert_eq!(dom.text(text), "only");
	let empty = renderer.render(&View::from_template(|_, _| VNode::Empty)).unwrap();
	assert_eq!(dom.text(empty), "");
}

#[test]
fn mount_appends_once() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let body = dom.create_element("body").unwrap();
	let view = View::from_template(|_, state| El::new("p").child(count(state, "n")).into());

	let p = renderer.mount(&view, &body).unwrap();
	assert_eq!(renderer.mount(&view, &body).unwrap(), p);
	assert_eq!(dom.children(body), [p]);

	dom.take_mutations();
	view.state().set("n", 3).unwrap();
	assert_eq!(dom.to_html(body), "<body><p>3</p></body>");
	assert!(!dom.take_mutations().iter().any(|mutation| matches!(mutation, Mutation::Insert { parent, .. } if *parent == body)));
}

struct Request {
	data: RefCell<Option<Value>>,
	callbacks: RefCell<Vec<Box<dyn FnOnce(Value)>>>,
	fetches: RefCell<usize>,
}

impl Request {
	fn complete(&self, data: Value) {
		*self.data.borrow_mut() = Some(data.clone());
		let callbacks: Vec<_> = self.callbacks.borrow_mut().drain(..).collect();
		for callback in callbacks {
			callback(data.clone())
		}
	}
}

impl DataSource for Request {
	fn fetch(&self) {
		*self.fetches.borrow_mut() += 1;
	}

	fn once_fetched(&self, callback: Box<dyn FnOnce(Value)>) {
		self.callbacks.borrow_mut().push(callback)
	}

	fn data(&self) -> Option<Value> {
		self.data.borrow().clone()
	}
}

#[test]
fn data_sources_rerender_on_completion() {
	let dom = MemoryDom::new();
	let renderer = Renderer::new(dom.clone());
	let request = Request {
		data: RefCell::new(Some(json!({ "user": "cached" }))),
		callbacks: RefCell::default(),
		fetches: RefCell::default(),
	};
	let view = View::from_template(|data, _| El::new("p").child(&data["user"]).into());

	View::connect(&view, &request);
	assert_eq!(*request.fetches.borrow(), 1);

	let p = renderer.render(&view).unwrap();
	assert_eq!(dom.to_html(p), "<p>cached</p>");

	request.complete(json!({ "user": "fresh" }));
	assert_eq!(dom.to_html(p), "<p>fresh</p>");
}
