use hook_dom::{
	hooks::{CellId, Setter},
	create_component, create_element, Attributes, EventHandler, Hooks, MarkupRenderer, MarkupTarget, Node, Props, QueueScheduler, Reconciler, UpdateError, Value,
};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

fn setup() -> (Reconciler<MarkupRenderer>, MarkupTarget, QueueScheduler) {
	let target = MarkupTarget::new();
	let scheduler = QueueScheduler::new();
	let reconciler = Reconciler::new(MarkupRenderer::new(), target.clone(), scheduler.clone());
	(reconciler, target, scheduler)
}

type SetterLog = Rc<RefCell<Vec<Setter<i32>>>>;

/// A counter that hands its setter out through `log` on every render.
fn counter(log: &SetterLog, key: i64) -> Node {
	let log = Rc::clone(log);
	create_component(
		move |_, hooks| {
			let (count, set_count) = hooks.use_state(0);
			log.borrow_mut().push(set_count);
			create_element("span", Attributes::new(), vec![count.into()])
		},
		Attributes::new().with("key", key),
		vec![],
	)
}

#[test]
fn counter_scenario() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();

	reconciler.render(counter(&log, 0)).unwrap();
	assert_eq!(target.markup(), "<span>0</span>");
	let cells: Vec<CellId> = reconciler.with_store(|store| store.iter().collect()).unwrap();
	assert_eq!(cells.len(), 1);

	let setter = log.borrow()[0].clone();
	assert_eq!(setter.cell(), cells[0]);
	setter.update(|count| count + 1);

	assert!(reconciler.is_repaint_pending());
	assert_eq!(target.markup(), "<span>0</span>");
	assert_eq!(scheduler.run_until_idle(), 1);
	assert_eq!(target.markup(), "<span>1</span>");

	assert_eq!(reconciler.with_store(|store| store.iter().collect::<Vec<_>>()).unwrap(), cells);
	assert_eq!(log.borrow().last().unwrap().cell(), cells[0]);
}

#[test]
fn updates_are_batched() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	assert_eq!(reconciler.renderer().paints(), 1);

	let setter = log.borrow()[0].clone();
	for _ in 0..5 {
		setter.update(|count| count + 1);
	}
	assert_eq!(scheduler.pending(), 1);
	assert_eq!(scheduler.run_until_idle(), 1);
	assert_eq!(reconciler.renderer().paints(), 2);
	assert_eq!(reconciler.renderer().clears(), 2);
	assert_eq!(target.markup(), "<span>5</span>");
	assert!(!reconciler.is_repaint_pending());
}

#[test]
fn no_updates_no_repaint() {
	let (reconciler, _target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();

	assert_eq!(scheduler.run_until_idle(), 0);
	assert_eq!(reconciler.renderer().paints(), 1);
}

#[test]
fn stale_closure_updates_live_instance() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();

	setter_at(&log, 0).set(10);
	scheduler.run_until_idle();
	// The first render's setter still reaches the same cell.
	setter_at(&log, 0).update(|count| count * 2);
	scheduler.run_until_idle();
	assert_eq!(target.markup(), "<span>20</span>");
}

fn setter_at(log: &SetterLog, index: usize) -> Setter<i32> {
	log.borrow()[index].clone()
}

#[test]
fn setter_of_unmounted_component_is_stale() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	let setter = setter_at(&log, 0);

	reconciler.render(create_element("p", Attributes::new(), vec!["replaced".into()])).unwrap();
	assert!(reconciler.with_store(|store| store.is_empty()).unwrap());
	assert_eq!(setter.try_set(3), Err(UpdateError::Stale { cell: setter.cell() }));
	setter.set(4);
	assert_eq!(scheduler.run_until_idle(), 0);
	assert_eq!(target.markup(), "<p>replaced</p>");
}

#[test]
fn setter_after_reconciler_drop_is_detached() {
	let (reconciler, _target, _scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	drop(reconciler);
	assert_eq!(setter_at(&log, 0).try_set(1), Err(UpdateError::Detached));
}

#[test]
fn replaced_fiber_is_detached() {
	let (reconciler, _target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	let old = reconciler.root().unwrap().as_fiber().unwrap().clone();

	setter_at(&log, 0).set(1);
	scheduler.run_until_idle();
	assert_eq!(reconciler.notify_update(&old), Err(UpdateError::Detached));

	let current = reconciler.root().unwrap().as_fiber().unwrap().clone();
	assert_eq!(reconciler.notify_update(&current), Ok(()));
	assert_eq!(scheduler.run_until_idle(), 1);
}

#[test]
fn update_during_render_is_refused() {
	let outcome = Rc::new(RefCell::new(None));
	let record = Rc::clone(&outcome);
	let root = create_component(
		move |_, hooks| {
			let (value, set) = hooks.use_state(0);
			if record.borrow().is_none() {
				*record.borrow_mut() = Some(set.try_set(value + 1));
			}
			Node::from(value)
		},
		Attributes::new(),
		vec![],
	);

	let (reconciler, target, _scheduler) = setup();
	reconciler.render(root).unwrap();
	assert_eq!(*outcome.borrow(), Some(Err(UpdateError::Busy)));
	assert_eq!(target.markup(), "<div>0</div>");
}

fn toggle_app(log: &SetterLog, shown: Rc<Cell<Option<Setter<bool>>>>) -> Node {
	let log = Rc::clone(log);
	create_component(
		move |_, hooks| {
			let (show, set_show) = hooks.use_state(true);
			shown.set(Some(set_show));
			let child = if show { counter(&log, 0) } else { Node::NULL };
			create_element("main", Attributes::new(), vec![child])
		},
		Attributes::new(),
		vec![],
	)
}

#[test]
fn hidden_child_state_is_excised() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();
	let shown = Rc::new(Cell::new(None));
	reconciler.render(toggle_app(&log, Rc::clone(&shown))).unwrap();
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 2);

	let child_setter = setter_at(&log, 0);
	child_setter.set(7);
	scheduler.run_until_idle();
	assert_eq!(target.markup(), "<main><span>7</span></main>");

	let set_show = shown.take().unwrap();
	set_show.set(false);
	scheduler.run_until_idle();
	assert_eq!(target.markup(), "<main></main>");
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 1);
	assert!(!reconciler.with_store(|store| store.contains(child_setter.cell())).unwrap());
	assert_eq!(child_setter.try_set(8), Err(UpdateError::Stale { cell: child_setter.cell() }));

	let set_show = shown.take().unwrap();
	set_show.set(true);
	scheduler.run_until_idle();
	// Remounted with fresh state.
	assert_eq!(target.markup(), "<main><span>0</span></main>");
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 2);
}

fn item(props: &Props, hooks: &mut Hooks<'_>) -> Node {
	let (clicks, set_clicks) = hooks.use_state(0);
	let label = props.get("label").and_then(Value::as_number).unwrap_or_default();
	create_element(
		"li",
		Attributes::new()
			.with("id", format!("{}-{}", props.get("group").and_then(Value::as_text).unwrap_or_default(), label))
			.with("onClick", EventHandler::new(move |_| set_clicks.update(|clicks| clicks + 1))),
		vec![format!("{}:{}", label, clicks).into()],
	)
}

fn keyed_list(group: &str, keys: &[i64]) -> Node {
	keys.iter()
		.map(|key| create_component(item, Attributes::new().with("key", *key).with("label", *key).with("group", group), vec![]))
		.collect()
}

/// Renders the same array literal twice as siblings and reverses both on click.
fn twin_lists(_: &Props, hooks: &mut Hooks<'_>) -> Node {
	let (forward, set_forward) = hooks.use_state(true);
	let order: &[i64] = if forward { &[1, 2, 3] } else { &[3, 2, 1] };
	let copies = vec![keyed_list("a", order), keyed_list("b", order)];
	create_element(
		"div",
		Attributes::new().with("id", "app").with("onClick", EventHandler::new(move |_| set_forward.update(|forward| !forward))),
		vec![Node::Sequence(copies)],
	)
}

#[test]
fn twin_keyed_sequences_reconcile_independently() {
	let (reconciler, target, scheduler) = setup();
	reconciler.render(create_component(twin_lists, Attributes::new(), vec![])).unwrap();
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 7);

	assert!(reconciler.find_by_id("a-3").unwrap().dispatch("click"));
	assert!(reconciler.find_by_id("b-1").unwrap().dispatch("click"));
	assert!(reconciler.find_by_id("b-1").unwrap().dispatch("click"));
	scheduler.run_until_idle();
	assert_eq!(
		target.markup(),
		concat!(
			r#"<div id="app">"#,
			r#"<li id="a-1">1:0</li><li id="a-2">2:0</li><li id="a-3">3:1</li>"#,
			r#"<li id="b-1">1:2</li><li id="b-2">2:0</li><li id="b-3">3:0</li>"#,
			"</div>",
		)
	);

	let cells: Vec<CellId> = reconciler.with_store(|store| store.iter().collect()).unwrap();
	assert!(reconciler.find_by_id("app").unwrap().dispatch("click"));
	assert_eq!(scheduler.run_until_idle(), 1);
	assert_eq!(
		target.markup(),
		concat!(
			r#"<div id="app">"#,
			r#"<li id="a-3">3:1</li><li id="a-2">2:0</li><li id="a-1">1:0</li>"#,
			r#"<li id="b-3">3:0</li><li id="b-2">2:0</li><li id="b-1">1:2</li>"#,
			"</div>",
		)
	);
	let mut after: Vec<CellId> = reconciler.with_store(|store| store.iter().collect()).unwrap();
	let mut before = cells;
	after.sort_by_key(|cell| format!("{:?}", cell));
	before.sort_by_key(|cell| format!("{:?}", cell));
	assert_eq!(after, before);
}

#[test]
fn unmount_clears_everything() {
	let (reconciler, target, _scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	reconciler.unmount().unwrap();

	assert_eq!(target.markup(), "");
	assert!(reconciler.root().is_none());
	assert!(reconciler.with_store(|store| store.is_empty()).unwrap());
	assert!(matches!(setter_at(&log, 0).try_set(1), Err(UpdateError::Stale { .. })));
}

#[test]
fn rendering_again_starts_fresh() {
	let (reconciler, target, scheduler) = setup();
	let log = SetterLog::default();
	reconciler.render(counter(&log, 0)).unwrap();
	setter_at(&log, 0).set(9);
	scheduler.run_until_idle();

	reconciler.render(counter(&log, 0)).unwrap();
	assert_eq!(target.markup(), "<span>0</span>");
	assert_eq!(reconciler.with_store(|store| store.len()).unwrap(), 1);
}
