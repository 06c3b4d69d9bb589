//! Integration Tests for Reconciliation
//!
//! These tests mount trees into a `MemoryHost` and check which host
//! mutations a re-render produces.

use std::cell::Cell;
use std::rc::Rc;

use trellis_core::{
    Component, Element, Error, HostOp, MemoryHost, NodeId, RenderOutcome, Scheduler, View,
};

fn mounted(view: impl Into<View>) -> (Scheduler<MemoryHost>, NodeId) {
    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    let root = scheduler.mount(container, view);
    scheduler.flush().unwrap();
    scheduler.host_mut().take_ops();
    (scheduler, root)
}

fn child_ids(scheduler: &Scheduler<MemoryHost>, parent: NodeId) -> Vec<NodeId> {
    scheduler
        .tree()
        .children(parent)
        .map(|node| node.id())
        .collect()
}

fn count(ops: &[HostOp], pred: impl Fn(&HostOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

/// A keyed rotation keeps every node and moves exactly one host node.
#[test]
fn keyed_reorder_moves_one_node() {
    let item = |key: i64| Element::host("li").key(key).child(key);

    let (mut scheduler, root) = mounted(vec![item(1), item(2), item(3)]);
    let before = child_ids(&scheduler, root);

    scheduler.render(root, vec![item(3), item(1), item(2)]).unwrap();
    scheduler.flush().unwrap();

    let after = child_ids(&scheduler, root);
    assert_eq!(after, vec![before[2], before[0], before[1]]);

    let container = scheduler.host().root();
    assert_eq!(
        scheduler.host().markup(container),
        "<li>3</li><li>1</li><li>2</li>"
    );

    let ops = scheduler.host().ops();
    assert_eq!(count(ops, HostOp::is_place), 1);
    assert_eq!(count(ops, HostOp::is_remove), 0);
    assert_eq!(count(ops, |op| matches!(op, HostOp::Create { .. })), 0);
}

/// Per-node state travels with the key.
#[test]
fn keyed_reorder_preserves_component_state() {
    let setups = Rc::new(Cell::new(0));
    let counted = setups.clone();
    let item = Component::new("Item", move |cx| {
        let label = cx.prop("label").map(|v| v.to_text()).unwrap_or_default();
        let first = cx.use_hook(|| {
            counted.set(counted.get() + 1);
            label.clone()
        });
        RenderOutcome::Ready(format!("{first}:{label} ").into())
    });
    let row = |key: &'static str| item.element().key(key).prop("label", key);

    let (mut scheduler, root) = mounted(vec![row("a"), row("b"), row("c")]);
    scheduler.render(root, vec![row("c"), row("a"), row("b")]).unwrap();
    scheduler.flush().unwrap();

    let container = scheduler.host().root();
    assert_eq!(scheduler.host().text_content(container), "c:c a:a b:b ");
    assert_eq!(setups.get(), 3);
}

/// Without keys, a swap is two in-place updates rather than a move.
#[test]
fn unkeyed_swap_updates_in_place() {
    let item = |id: &'static str| Element::host("li").attr("id", id).child(id);

    let (mut scheduler, root) = mounted(vec![item("x"), item("y")]);
    let before = child_ids(&scheduler, root);

    scheduler.render(root, vec![item("y"), item("x")]).unwrap();
    scheduler.flush().unwrap();

    assert_eq!(child_ids(&scheduler, root), before);
    let ops = scheduler.host().ops();
    assert_eq!(count(ops, HostOp::is_place), 0);
    assert_eq!(count(ops, HostOp::is_remove), 0);
    assert_eq!(count(ops, |op| matches!(op, HostOp::Update { .. })), 4);

    let container = scheduler.host().root();
    assert_eq!(
        scheduler.host().markup(container),
        "<li id=\"y\">y</li><li id=\"x\">x</li>"
    );
}

/// Inserted items land between their neighbours.
#[test]
fn insertion_places_before_the_next_sibling() {
    let item = |key: &'static str| Element::host("li").key(key).child(key);

    let (mut scheduler, root) = mounted(vec![item("a"), item("c")]);
    scheduler
        .render(root, vec![item("a"), item("b"), item("c")])
        .unwrap();
    scheduler.flush().unwrap();

    let container = scheduler.host().root();
    assert_eq!(
        scheduler.host().markup(container),
        "<li>a</li><li>b</li><li>c</li>"
    );
    // Only the new <li> is placed into the container; its text goes inside it.
    let into_container = count(scheduler.host().ops(), |op| {
        matches!(op, HostOp::Place { parent, .. } if *parent == container)
    });
    assert_eq!(into_container, 1);
}

/// Conflicting attributes fail before the host sees anything.
#[test]
fn conflicting_attributes_fail_before_commit() {
    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(
        container,
        Element::host("input").attr("value", 1).attr("value", 2),
    );

    let err = scheduler.flush().unwrap_err();
    assert!(matches!(err, Error::ConflictingBinding { ref attr, .. } if attr == "value"));
    assert!(scheduler.host().ops().is_empty());
}

/// A component receiving identical props is not called again.
#[test]
fn unchanged_props_skip_the_component() {
    let renders = Rc::new(Cell::new(0));
    let counted = renders.clone();
    let label = Component::new("Label", move |cx| {
        counted.set(counted.get() + 1);
        RenderOutcome::Ready(cx.prop("text").map(|v| v.to_text()).unwrap_or_default().into())
    });
    let view = |text: &'static str| label.element().prop("text", text);

    let (mut scheduler, root) = mounted(view("one"));
    scheduler.render(root, view("one")).unwrap();
    scheduler.flush().unwrap();
    assert_eq!(renders.get(), 1);

    scheduler.render(root, view("two")).unwrap();
    scheduler.flush().unwrap();
    assert_eq!(renders.get(), 2);
    assert_eq!(
        scheduler.host().text_content(scheduler.host().root()),
        "two"
    );
}

/// Replacing a host element by one of another tag recreates it.
#[test]
fn type_change_replaces_the_host_node() {
    let (mut scheduler, root) = mounted(Element::host("p").child("x"));
    scheduler.render(root, Element::host("div").child("x")).unwrap();
    scheduler.flush().unwrap();

    let ops = scheduler.host().ops();
    assert_eq!(count(ops, HostOp::is_remove), 1);
    assert_eq!(
        scheduler.host().markup(scheduler.host().root()),
        "<div>x</div>"
    );
}

/// Setup runs once; the returned render function is reused.
#[test]
fn setup_components_run_setup_once() {
    let setups = Rc::new(Cell::new(0));
    let counted = setups.clone();
    let ticker = Component::new("Ticker", move |cx| {
        counted.set(counted.get() + 1);
        let count = cx.use_signal(|| 0i64);
        RenderOutcome::setup(move |_cx| RenderOutcome::Ready(count.get().into()))
    });

    let (mut scheduler, root) = mounted(ticker.element());
    let node = scheduler.tree().get_node(root).and_then(|n| n.first_child()).unwrap();
    scheduler.request_update(node);
    scheduler.flush().unwrap();
    scheduler.request_update(node);
    scheduler.flush().unwrap();

    assert_eq!(setups.get(), 1);
    assert_eq!(scheduler.host().text_content(scheduler.host().root()), "0");
}
