use hook_dom::{
	fiber::Materialized,
	hooks::{CellId, Setter},
	node::Component,
	create_component, create_element, Attributes, Hooks, MarkupRenderer, MarkupTarget, Node, Props, QueueScheduler, Reconciler, RenderContext, UpdateError, Value,
};
use std::{
	cell::{Cell, RefCell},
	panic::{self, AssertUnwindSafe},
	rc::Rc,
};

fn counted(props: &Props, hooks: &mut Hooks<'_>) -> Node {
	let count = props.get("count").and_then(Value::as_number).unwrap_or(0.0) as usize;
	let values: Vec<Node> = (0..count).map(|i| hooks.use_state(i).0.into()).collect();
	create_element("ul", Attributes::new(), values)
}

fn counted_with(count: usize) -> Rc<Component> {
	Rc::new(Component::new(counted, Attributes::new().with("count", count), vec![]))
}

#[test]
fn reinstantiation_reuses_cells() {
	let mut context = RenderContext::new();
	let component = counted_with(2);

	let first = context.instantiate(&component, None);
	let cells = context.store().range_cells(first.states().unwrap());
	assert_eq!(cells.len(), 2);
	assert_eq!(context.store().len(), 2);
	assert!(context.store().is_at_rest());

	let second = context.instantiate(&component, first.states());
	assert_eq!(context.store().range_cells(second.states().unwrap()), cells);
	assert_eq!(context.store().len(), 2);
	assert!(context.store().is_at_rest());
	assert!(Rc::ptr_eq(&context.store().owner(cells[0]).unwrap(), &second));
	assert!(Rc::ptr_eq(&context.store().owner(cells[1]).unwrap(), &second));
}

#[test]
fn stateless_component_has_no_range() {
	let mut context = RenderContext::new();
	let fiber = context.instantiate(&counted_with(0), None);
	assert_eq!(fiber.states(), None);
	assert!(fiber.factory().is_some());
	assert!(context.store().is_empty());
}

#[test]
fn unread_cells_are_released() {
	let mut context = RenderContext::new();
	let first = context.instantiate(&counted_with(3), None);
	let cells = context.store().range_cells(first.states().unwrap());

	let second = context.instantiate(&counted_with(1), first.states());
	assert_eq!(context.store().range_cells(second.states().unwrap()), vec![cells[0]]);
	assert_eq!(context.store().len(), 1);
	assert!(!context.store().contains(cells[1]));
	assert!(!context.store().contains(cells[2]));
	assert_eq!(context.store().free_slots(), 2);
}

#[test]
fn growing_range_stays_contiguous() {
	let mut context = RenderContext::new();
	let a = context.instantiate(&counted_with(1), None);
	let b = context.instantiate(&counted_with(1), None);
	let a_cell = a.states().unwrap().start();
	let b_cell = b.states().unwrap().start();

	let grown = context.instantiate(&counted_with(2), a.states());
	let grown_cells = context.store().range_cells(grown.states().unwrap());
	assert_eq!(grown_cells.len(), 2);
	assert_eq!(grown_cells[0], a_cell);

	let order: Vec<CellId> = context.store().iter().collect();
	assert_eq!(order, vec![grown_cells[0], grown_cells[1], b_cell]);
	assert!(Rc::ptr_eq(&context.store().owner(b_cell).unwrap(), &b));
}

#[test]
fn values_survive_reinstantiation() {
	let mut context = RenderContext::new();
	let component = counted_with(3);
	let first = context.instantiate(&component, None);
	let second = context.instantiate(&component, first.states());

	let values: Vec<usize> = context
		.store()
		.range_cells(second.states().unwrap())
		.into_iter()
		.map(|cell| *context.store().value(cell).unwrap().downcast_ref::<usize>().unwrap())
		.collect();
	assert_eq!(values, vec![0, 1, 2]);
}

fn fragile(props: &Props, hooks: &mut Hooks<'_>) -> Node {
	let (value, _) = hooks.use_state(1);
	if props.get("fail").and_then(Value::as_bool) == Some(true) {
		let _ = hooks.use_state(2);
		panic!("render failure");
	}
	value.into()
}

#[test]
fn panic_restores_cursor() {
	let mut context = RenderContext::new();
	let failing = Rc::new(Component::new(fragile, Attributes::new().with("fail", true), vec![]));

	let result = panic::catch_unwind(AssertUnwindSafe(|| context.instantiate(&failing, None)));
	assert!(result.is_err());
	assert!(context.store().is_at_rest());
	assert!(context.store().is_empty());
}

#[test]
fn panic_keeps_prior_range() {
	let mut context = RenderContext::new();
	let healthy = Rc::new(Component::new(fragile, Attributes::new(), vec![]));
	let failing = Rc::new(Component::new(fragile, Attributes::new().with("fail", true), vec![]));

	let first = context.instantiate(&healthy, None);
	let cell = first.states().unwrap().start();

	let result = panic::catch_unwind(AssertUnwindSafe(|| context.instantiate(&failing, first.states())));
	assert!(result.is_err());
	assert!(context.store().is_at_rest());
	assert_eq!(context.store().len(), 1);
	assert!(context.store().contains(cell));

	let again = context.instantiate(&healthy, first.states());
	assert_eq!(again.states().unwrap().start(), cell);
	assert_eq!(context.store().len(), 1);
}

/// A counter whose child panics while `failing` is set.
fn parent_of_fragile_child(failing: &Rc<Cell<bool>>, setters: &Rc<RefCell<Vec<Setter<i32>>>>) -> Node {
	let failing = Rc::clone(failing);
	let setters = Rc::clone(setters);
	create_component(
		move |_, hooks| {
			let (count, set_count) = hooks.use_state(0);
			setters.borrow_mut().push(set_count);
			let failing = Rc::clone(&failing);
			let child = create_component(
				move |_, hooks| {
					let _ = hooks.use_state(0);
					if failing.get() {
						panic!("child render failure");
					}
					Node::from("child")
				},
				Attributes::new(),
				vec![],
			);
			create_element("main", Attributes::new(), vec![count.into(), child])
		},
		Attributes::new(),
		vec![],
	)
}

#[test]
fn child_panic_keeps_parent_state_attached() {
	let failing = Rc::new(Cell::new(false));
	let setters = Rc::new(RefCell::new(Vec::new()));
	let target = MarkupTarget::new();
	let scheduler = QueueScheduler::new();
	let reconciler = Reconciler::new(MarkupRenderer::new(), target.clone(), scheduler.clone());
	reconciler.render(parent_of_fragile_child(&failing, &setters)).unwrap();
	assert_eq!(target.markup(), "<main>0<div>child</div></main>");
	let cells: Vec<CellId> = reconciler.with_store(|store| store.iter().collect()).unwrap();
	assert_eq!(cells.len(), 2);

	let setter = setters.borrow()[0].clone();
	failing.set(true);
	let result = panic::catch_unwind(AssertUnwindSafe(|| setter.try_set(1)));
	assert!(result.is_err());

	assert!(reconciler.with_store(|store| store.is_at_rest()).unwrap());
	assert_eq!(reconciler.with_store(|store| store.iter().collect::<Vec<_>>()).unwrap(), cells);
	let root = reconciler.root().unwrap().as_fiber().unwrap().clone();
	assert_eq!(root.states().map(|range| range.start()), Some(cells[0]));
	assert!(Rc::ptr_eq(&reconciler.with_store(|store| store.owner(cells[0])).unwrap().unwrap(), &root));

	failing.set(false);
	assert_eq!(setter.try_set(2), Ok(()));
	assert_eq!(scheduler.run_until_idle(), 1);
	assert_eq!(target.markup(), "<main>2<div>child</div></main>");
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 2);
}

#[test]
fn panic_during_expansion_frees_sibling_state() {
	let root = create_element(
		"main",
		Attributes::new(),
		vec![
			create_component(fragile, Attributes::new(), vec![]),
			create_component(fragile, Attributes::new().with("fail", true), vec![]),
		],
	);

	let mut context = RenderContext::new();
	let result = panic::catch_unwind(AssertUnwindSafe(|| context.expand(&root)));
	assert!(result.is_err());
	assert!(context.store().is_at_rest());
	assert!(context.store().is_empty());
}

fn typed(props: &Props, hooks: &mut Hooks<'_>) -> Node {
	if props.get("text").and_then(Value::as_bool) == Some(true) {
		hooks.use_state("text".to_owned()).0.into()
	} else {
		hooks.use_state(5).0.into()
	}
}

#[test]
fn type_change_resets_cell() {
	let mut context = RenderContext::new();
	let number = Rc::new(Component::new(typed, Attributes::new(), vec![]));
	let text = Rc::new(Component::new(typed, Attributes::new().with("text", true), vec![]));

	let first = context.instantiate(&number, None);
	let cell = first.states().unwrap().start();
	assert_eq!(context.store().value(cell).unwrap().downcast_ref::<i32>(), Some(&5));

	let second = context.instantiate(&text, first.states());
	assert_eq!(second.states().unwrap().start(), cell);
	assert_eq!(context.store().value(cell).unwrap().downcast_ref::<String>().map(String::as_str), Some("text"));
}

#[test]
fn lazy_initial_value_is_computed_once() {
	let calls = Rc::new(Cell::new(0));
	let counter = Rc::clone(&calls);
	let component = match create_component(
		move |_, hooks| {
			let (value, _) = hooks.use_state_with(|| {
				counter.set(counter.get() + 1);
				7
			});
			value.into()
		},
		Attributes::new(),
		vec![],
	) {
		Node::Component(component) => component,
		_ => unreachable!(),
	};

	let mut context = RenderContext::new();
	let first = context.instantiate(&component, None);
	let second = context.instantiate(&component, first.states());
	let _third = context.instantiate(&component, second.states());
	assert_eq!(calls.get(), 1);
}

#[test]
fn setter_without_reconciler_is_detached() {
	let setters = Rc::new(RefCell::new(Vec::<Setter<i32>>::new()));
	let sink = Rc::clone(&setters);
	let root = create_component(
		move |_, hooks| {
			let (value, set) = hooks.use_state(0);
			sink.borrow_mut().push(set);
			value.into()
		},
		Attributes::new(),
		vec![],
	);

	let mut context = RenderContext::new();
	let _tree = context.expand(&root);
	let setter = setters.borrow()[0].clone();
	assert_eq!(setter.try_set(1), Err(UpdateError::Detached));
	assert_eq!(setter.try_update(|value| value + 1), Err(UpdateError::Detached));
}

fn leaf(_: &Props, hooks: &mut Hooks<'_>) -> Node {
	hooks.use_state(0).0.into()
}

fn branch(props: &Props, hooks: &mut Hooks<'_>) -> Node {
	let _ = hooks.use_state("branch");
	create_element("section", Attributes::new(), props.children().to_vec())
}

#[test]
fn excision_reaches_nested_ranges() {
	let root = create_element(
		"main",
		Attributes::new(),
		vec![
			create_component(leaf, Attributes::new(), vec![]),
			create_component(branch, Attributes::new(), vec![create_component(leaf, Attributes::new(), vec![]), create_component(leaf, Attributes::new(), vec![])]),
		],
	);

	let mut context = RenderContext::new();
	let tree = context.expand(&root);
	assert_eq!(context.store().len(), 4);
	let cells: Vec<CellId> = context.store().iter().collect();

	context.excise(&tree);
	assert!(context.store().is_empty());
	assert_eq!(context.store().iter().count(), 0);
	assert!(cells.into_iter().all(|cell| !context.store().contains(cell)));

	let fiber = match &tree {
		Materialized::Fiber(fiber) => fiber,
		_ => unreachable!(),
	};
	assert!(fiber.children().iter().all(|child| child.as_fiber().unwrap().states().is_none()));
}
