#![forbid(unsafe_code)]

//! End-to-end history scenarios.
//!
//! Drive an [`ActionHistory`] the way a state container would: append
//! commands, settle them out of order, time travel, and check the event
//! stream a reducer would replay.
//!
//! Run:
//!   cargo test -p rewind-runtime --test history_scenarios

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use rewind_runtime::{
    ActionHistory, ActionId, Command, Deferred, Event, EventKind, FlushQueue, HistoryConfig,
    HistoryEvent, Resolver, Status, Updater,
};

// ============================================================================
// Helpers
// ============================================================================

fn record(history: &ActionHistory<i64>) -> Rc<RefCell<Vec<HistoryEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    history.on_any(move |event| sink.borrow_mut().push(*event));
    log
}

fn updates(log: &Rc<RefCell<Vec<HistoryEvent>>>) -> Vec<ActionId> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            HistoryEvent::Update(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn count(log: &Rc<RefCell<Vec<HistoryEvent>>>, kind: EventKind) -> usize {
    log.borrow().iter().filter(|event| event.kind() == kind).count()
}

/// Replays `Update` events into a running total of resolved, enabled
/// payloads on the active branch.
fn counter_reducer(history: &ActionHistory<i64>) -> Rc<Cell<i64>> {
    let total = Rc::new(Cell::new(0));
    let sink = Rc::clone(&total);
    let view = history.clone();
    history.on(EventKind::Update, move |_| {
        let sum: i64 = view
            .map(|action| {
                if action.is_disabled() || !action.is(Status::Resolve) {
                    0
                } else {
                    action.payload().copied().unwrap_or(0)
                }
            })
            .into_iter()
            .sum();
        sink.set(sum);
    });
    total
}

fn poll_once(wait: &mut rewind_runtime::Wait<i64>) -> Poll<rewind_runtime::WaitResult<i64>> {
    let mut cx = Context::from_waker(Waker::noop());
    Pin::new(wait).poll(&mut cx)
}

// ============================================================================
// Size and structure
// ============================================================================

#[test]
fn size_matches_branch_after_mixed_operations() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::new(3));
    let a = history.append("a", None);
    let b = history.append("b", None);
    history.resolve(a, Some(1));
    history.checkout(Some(a));
    let c = history.append("c", None);
    history.resolve(c, Some(3));
    history.remove(b);
    history.append("d", None);

    assert_eq!(history.size(), history.to_array().len());
    assert_eq!(history.to_array().first().copied(), history.root());
    assert_eq!(history.to_array().last().copied(), history.head());
}

#[test]
fn checkout_forks_history() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let start = history.head().unwrap();
    let a = history.append("a", None);
    let b = history.append("b", None);
    let c = history.append("c", None);
    history.checkout(Some(a));
    let d = history.append("d", None);

    assert_eq!(history.to_array(), vec![start, a, d]);
    assert!(!history.is_active(b));
    assert!(!history.is_active(c));
    // The abandoned branch still hangs off `a`.
    assert_eq!(history.action(b).unwrap().parent(), Some(a));
    assert_eq!(history.action(c).unwrap().parent(), Some(b));
}

#[test]
fn checkout_back_onto_abandoned_branch() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let start = history.head().unwrap();
    let a = history.append("a", None);
    let b = history.append("b", None);
    let c = history.append("c", None);
    history.checkout(Some(a));
    history.append("d", None);

    let log = record(&history);
    history.checkout(Some(c));

    assert_eq!(history.head(), Some(c));
    assert_eq!(history.to_array(), vec![start, a, b, c]);
    assert_eq!(history.size(), 4);
    // Replay starts at the fork point.
    assert_eq!(updates(&log), vec![a, b, c]);
}

#[test]
fn checkout_behind_retained_window_reroots() {
    let history: ActionHistory<i64> = ActionHistory::default();
    let start = history.head().unwrap();
    let a = history.append("a", None);
    history.resolve(a, None);
    assert_eq!(history.root(), Some(a));

    // `start` now sits above the window as the root's parent.
    history.checkout(Some(start));
    assert_eq!(history.root(), Some(start));
    assert_eq!(history.size(), 1);

    let x = history.append("x", None);
    history.resolve(x, None);
    assert_eq!(history.root(), Some(x));

    history.checkout(Some(a));
    assert_eq!(history.head(), Some(a));
    assert_eq!(history.to_array(), vec![a]);
    assert_eq!(history.size(), 1);
    assert!(!history.is_active(x));
}

// ============================================================================
// Reconcile ordering
// ============================================================================

#[test]
fn updates_follow_branch_order() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let ids: Vec<ActionId> = (0..6).map(|n| history.append(format!("step-{n}"), None)).collect();
    let log = record(&history);

    history.resolve(ids[2], Some(2));
    assert_eq!(updates(&log), ids[2..].to_vec());

    log.borrow_mut().clear();
    history.resolve(ids[5], Some(5));
    assert_eq!(updates(&log), vec![ids[5]]);
}

#[test]
fn reducer_sees_out_of_order_resolution() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let total = counter_reducer(&history);

    let slow = history.append("slow", None);
    let fast = history.append("fast", None);
    history.resolve(fast, Some(10));
    assert_eq!(total.get(), 10);

    history.resolve(slow, Some(5));
    assert_eq!(total.get(), 15);

    history.toggle(&[slow]);
    assert_eq!(total.get(), 10);
}

#[test]
fn toggle_reconciles_once_from_earliest() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("a", None);
    let b = history.append("b", None);
    let c = history.append("c", None);
    let log = record(&history);

    history.toggle(&[c, a]);

    assert_eq!(count(&log, EventKind::Reconcile), 1);
    assert_eq!(updates(&log), vec![a, b, c]);
    assert!(history.action(a).unwrap().is_disabled());
    assert!(!history.action(b).unwrap().is_disabled());
    assert!(history.action(c).unwrap().is_disabled());
}

#[test]
fn toggle_of_inactive_actions_does_not_reconcile() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("a", None);
    let b = history.append("b", None);
    history.checkout(Some(a));
    let log = record(&history);

    history.toggle(&[b]);
    assert!(log.borrow().is_empty());
    assert!(history.action(b).unwrap().is_disabled());
}

// ============================================================================
// Archival
// ============================================================================

#[test]
fn limit_one_archives_one_ancestor_per_resolution() {
    let history: ActionHistory<i64> = ActionHistory::default();
    let a = history.append("a", None);
    history.resolve(a, None);
    let a_parent = history.action(a).unwrap().parent().unwrap();

    let b = history.append("b", None);
    let log = record(&history);
    history.resolve(b, None);

    assert_eq!(history.root(), Some(b));
    assert_eq!(history.size(), 1);
    let removed: Vec<_> = log
        .borrow()
        .iter()
        .filter(|event| event.kind() == EventKind::Remove)
        .copied()
        .collect();
    assert_eq!(removed, vec![HistoryEvent::Remove(a_parent)]);
}

#[test]
fn archive_passes_several_resolved_roots() {
    let history: ActionHistory<i64> = ActionHistory::default();
    let start = history.head().unwrap();
    let birth = history.action(start).unwrap().parent().unwrap();
    let log = record(&history);

    let a = history.append("a", None);
    let b = history.append("b", None);
    history.resolve(a, None);

    // Both the resolved start and `a` leave the window in one pass.
    let removed: Vec<_> = log
        .borrow()
        .iter()
        .filter(|event| event.kind() == EventKind::Remove)
        .copied()
        .collect();
    assert_eq!(
        removed,
        vec![HistoryEvent::Remove(birth), HistoryEvent::Remove(start)]
    );
    assert_eq!(history.root(), Some(b));
    assert_eq!(history.size(), 1);

    log.borrow_mut().clear();
    history.resolve(b, None);
    assert_eq!(count(&log, EventKind::Remove), 0);
    assert_eq!(history.root(), Some(b));
}

#[test]
fn archive_stops_at_open_action() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::new(2));
    let a = history.append("a", None);
    history.open(a, None);
    for n in 0..5 {
        let id = history.append("tick", None);
        history.resolve(id, Some(n));
    }

    assert_eq!(history.root(), Some(a));
    assert_eq!(history.size(), 6);

    history.resolve(a, None);
    assert_eq!(history.size(), 2);
}

#[test]
fn archive_twice_changes_nothing() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::new(3));
    for n in 0..10 {
        let id = history.append("tick", None);
        history.resolve(id, Some(n));
    }
    let log = record(&history);
    let before = history.snapshot();

    history.archive();
    history.archive();

    assert_eq!(history.snapshot(), before);
    assert!(log.borrow().is_empty());
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn removing_root_advances_root() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let start = history.head().unwrap();
    let a = history.append("a", None);
    let b = history.append("b", None);

    history.remove(start);
    assert_eq!(history.root(), Some(a));
    assert_eq!(history.to_array(), vec![a, b]);
    assert_eq!(history.size(), 2);
}

#[test]
fn removing_abandoned_action_keeps_size() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("a", None);
    let b = history.append("b", None);
    history.checkout(Some(a));
    history.append("c", None);
    let size = history.size();
    let log = record(&history);

    history.remove(b);
    assert_eq!(history.size(), size);
    assert_eq!(count(&log, EventKind::Reconcile), 0);
    assert_eq!(count(&log, EventKind::Remove), 1);
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn many_reconciles_one_release_per_frame() {
    let history: ActionHistory<i64> =
        ActionHistory::new(HistoryConfig::unlimited().with_batch(true));
    let log = record(&history);

    for n in 0..10 {
        let id = history.append("tick", None);
        history.resolve(id, Some(n));
    }
    assert_eq!(count(&log, EventKind::Reconcile), 10);
    assert_eq!(count(&log, EventKind::Release), 0);

    assert_eq!(history.flush(), 1);
    assert_eq!(count(&log, EventKind::Release), 1);

    // The next frame gets its own release.
    let id = history.append("tick", None);
    history.resolve(id, None);
    history.flush();
    assert_eq!(count(&log, EventKind::Release), 2);
}

#[test]
fn shared_queue_updater() {
    let queue = FlushQueue::new();
    let updater: Rc<dyn Updater> = Rc::new(Deferred::new(queue.clone()));
    let first: ActionHistory<i64> =
        ActionHistory::with_updater(HistoryConfig::unlimited(), Rc::clone(&updater));
    let second: ActionHistory<i64> =
        ActionHistory::with_updater(HistoryConfig::unlimited(), updater);

    let a = first.append("a", None);
    first.resolve(a, None);
    let b = second.append("b", None);
    second.resolve(b, None);

    // The histories' own queues are unused.
    assert_eq!(first.flush(), 0);
    assert_eq!(queue.pending(), 2);
    assert_eq!(queue.flush(), 2);
    assert!(!first.is_releasing());
    assert!(!second.is_releasing());
}

struct Counting {
    scheduled: Rc<Cell<usize>>,
}

impl Updater for Counting {
    fn schedule(&self, resolver: Resolver) {
        self.scheduled.set(self.scheduled.get() + 1);
        resolver.resolve();
    }

    fn name(&self) -> &str {
        "Counting"
    }
}

#[test]
fn custom_updater_is_called_per_release() {
    let scheduled = Rc::new(Cell::new(0));
    let history: ActionHistory<i64> = ActionHistory::with_updater(
        HistoryConfig::default(),
        Rc::new(Counting {
            scheduled: Rc::clone(&scheduled),
        }),
    );

    let a = history.append("a", None);
    history.resolve(a, None);
    history.checkout(None);
    assert_eq!(scheduled.get(), 2);
    assert!(format!("{history:?}").contains("Counting"));
}

// ============================================================================
// Waiting
// ============================================================================

#[test]
fn wait_settles_immediately_when_idle() {
    let history: ActionHistory<i64> = ActionHistory::default();
    let mut wait = history.wait();
    assert!(wait.is_settled());
    assert_eq!(poll_once(&mut wait), Poll::Ready(Ok(())));
}

#[test]
fn wait_is_pending_while_release_outstanding() {
    let history: ActionHistory<i64> =
        ActionHistory::new(HistoryConfig::unlimited().with_batch(true));
    let a = history.append("a", None);
    history.resolve(a, None);

    let mut wait = history.wait();
    assert!(poll_once(&mut wait).is_pending());

    history.flush();
    assert_eq!(poll_once(&mut wait), Poll::Ready(Ok(())));
}

#[test]
fn wait_ignores_actions_appended_later() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("a", None);
    let wait = history.wait();

    let later = history.append("later", None);
    history.resolve(a, None);

    assert_eq!(wait.result(), Some(Ok(())));
    assert!(!history.action(later).unwrap().is_complete());
}

#[test]
fn then_reports_rejection() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("save", None);
    let outcome = Rc::new(RefCell::new(None));
    let fulfilled = Rc::clone(&outcome);
    let rejected = Rc::clone(&outcome);

    let _ = history.then(
        move || *fulfilled.borrow_mut() = Some(Ok(())),
        move |rejection| *rejected.borrow_mut() = Some(Err(rejection)),
    );
    history.reject(a, Some(-1));

    let outcome = outcome.borrow().clone().unwrap();
    let rejection = outcome.unwrap_err();
    assert_eq!(rejection.action, a);
    assert_eq!(rejection.command, Command::new("save"));
    assert_eq!(rejection.payload, Some(-1));
}

#[test]
fn wait_counts_archived_actions_as_complete() {
    let history: ActionHistory<i64> = ActionHistory::default();
    let a = history.append("a", None);
    let b = history.append("b", None);
    let wait = history.wait();

    history.resolve(a, None);
    history.resolve(b, None);
    history.append("c", None);

    assert_eq!(wait.result(), Some(Ok(())));
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn json_lists_forks_under_their_parent() {
    let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::unlimited());
    let a = history.append("a", None);
    history.append("b", None);
    history.checkout(Some(a));
    history.append("c", None);

    let json = history.to_json().unwrap();
    let a_node = &json["tree"]["children"][0];
    assert_eq!(a_node["command"], "a");
    let forks: Vec<&str> = a_node["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|child| child["command"].as_str().unwrap())
        .collect();
    assert_eq!(forks, vec!["b", "c"]);
}
