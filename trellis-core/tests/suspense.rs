//! Integration Tests for Suspense
//!
//! Components return `Pending` while a resource loads; the nearest boundary
//! shows its fallback and is re-requested once the load settles.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::oneshot;
use trellis_core::{
    Boundary, Caught, Component, Element, LoadState, MemoryHost, RenderError, RenderOutcome,
    Resource, Scheduler, View,
};

/// A component reading `resource`, starting the load from `rx` on first use.
fn reader(resource: &Resource<String>, rx: oneshot::Receiver<String>) -> Component {
    let resource = resource.clone();
    let rx = RefCell::new(Some(rx));
    Component::new("Reader", move |_cx| match resource.state() {
        LoadState::Idle => {
            let rx = rx.borrow_mut().take();
            resource
                .load(move |_abort| async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|_| RenderError::new("sender dropped")),
                        None => Err(RenderError::new("already loaded once")),
                    }
                })
                .into()
        }
        LoadState::Loading => resource.settled().into(),
        LoadState::Ready(text) => Element::host("b").child(text).into(),
        LoadState::Failed(error) => error.into(),
    })
}

fn fallback(caught: Caught<'_>) -> View {
    match caught {
        Caught::Pending => "loading".into(),
        Caught::Error(error) => format!("error: {error}").into(),
    }
}

#[tokio::test]
async fn boundary_shows_fallback_until_the_resource_resolves() {
    let resource = Resource::new();
    let (tx, rx) = oneshot::channel();

    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(
        container,
        Boundary::new(fallback).wrap(reader(&resource, rx).element()),
    );
    scheduler.flush().unwrap();

    assert_eq!(scheduler.host().markup(container), "loading");
    assert_eq!(scheduler.pending_suspensions(), 1);
    assert!(resource.state().is_loading());

    tx.send("ready".to_string()).unwrap();
    scheduler.settle().await.unwrap();

    assert_eq!(scheduler.host().markup(container), "<b>ready</b>");
    assert_eq!(scheduler.pending_suspensions(), 0);
}

#[tokio::test]
async fn failed_loads_reach_the_error_fallback() {
    let resource = Resource::new();
    let (tx, rx) = oneshot::channel::<String>();

    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(
        container,
        Boundary::new(fallback).wrap(reader(&resource, rx).element()),
    );
    scheduler.flush().unwrap();

    drop(tx);
    scheduler.settle().await.unwrap();

    assert_eq!(scheduler.host().markup(container), "error: sender dropped");
}

/// Without a boundary the suspended component renders nothing and is
/// re-requested itself.
#[tokio::test]
async fn suspension_without_a_boundary_retries_the_component() {
    let resource = Resource::new();
    let (tx, rx) = oneshot::channel();

    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(
        container,
        vec![
            View::from(reader(&resource, rx).element()),
            Element::host("i").child("rest").into(),
        ],
    );
    scheduler.flush().unwrap();
    assert_eq!(scheduler.host().markup(container), "<i>rest</i>");

    tx.send("late".to_string()).unwrap();
    scheduler.settle().await.unwrap();
    assert_eq!(scheduler.host().markup(container), "<b>late</b><i>rest</i>");
}

/// A pending render handed straight back resolves once the future does.
#[tokio::test]
async fn pending_outcomes_wrap_any_future() {
    let (tx, rx) = oneshot::channel::<()>();
    let rx = RefCell::new(Some(rx));
    let done = Rc::new(RefCell::new(false));
    let flag = done.clone();

    let gate = Component::new("Gate", move |_cx| {
        if *flag.borrow() {
            return "open".into();
        }
        match rx.borrow_mut().take() {
            Some(rx) => {
                let flag = flag.clone();
                RenderOutcome::Pending(trellis_core::Suspension::new(async move {
                    let _ = rx.await;
                    *flag.borrow_mut() = true;
                }))
            }
            None => RenderError::new("gate polled twice").into(),
        }
    });

    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(container, Boundary::new(fallback).wrap(gate.element()));
    scheduler.flush().unwrap();
    assert_eq!(scheduler.host().markup(container), "loading");

    tx.send(()).unwrap();
    scheduler.settle().await.unwrap();
    assert_eq!(scheduler.host().markup(container), "open");
    assert!(*done.borrow());
}
