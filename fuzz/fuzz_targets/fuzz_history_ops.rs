#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rewind_core::ActionId;
use rewind_runtime::{ActionHistory, HistoryConfig};

#[derive(Debug, Arbitrary)]
enum Op {
    Append,
    Open(u8),
    Resolve(u8),
    Reject(u8),
    Cancel(u8),
    Checkout(Option<u8>),
    Remove(u8),
    Toggle(Vec<u8>),
    Archive,
    Flush,
}

#[derive(Debug, Arbitrary)]
struct Input {
    limit: u8,
    batch: bool,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    if input.ops.len() > 256 {
        return;
    }

    let config = HistoryConfig::new(usize::from(input.limit % 8)).with_batch(input.batch);
    let limit = config.limit();
    let history: ActionHistory<u8> = ActionHistory::new(config);
    let start = history.head().expect("fresh history has a head");
    let birth = history
        .action(start)
        .and_then(|action| action.parent())
        .expect("start hangs off the birth sentinel");
    let mut known: Vec<ActionId> = vec![start, birth];

    for op in input.ops {
        let archived = matches!(op, Op::Archive);
        if let Op::Append = op {
            known.push(history.append("op", None));
        }

        let pick = |n: u8| known.get(usize::from(n) % known.len().max(1)).copied();
        match op {
            Op::Append => {}
            Op::Open(n) => {
                if let Some(id) = pick(n) {
                    history.open(id, Some(n));
                }
            }
            Op::Resolve(n) => {
                if let Some(id) = pick(n) {
                    history.resolve(id, Some(n));
                }
            }
            Op::Reject(n) => {
                if let Some(id) = pick(n) {
                    history.reject(id, Some(n));
                }
            }
            Op::Cancel(n) => {
                if let Some(id) = pick(n) {
                    history.cancel(id);
                }
            }
            Op::Checkout(n) => {
                let target = n.and_then(pick);
                let stranded = target.is_some_and(|id| history.shared_root(id).is_none());
                let before = stranded.then(|| history.snapshot());
                history.checkout(target);
                if let Some(before) = before {
                    assert_eq!(history.snapshot(), before, "checkout without shared root moved");
                }
            }
            Op::Remove(n) => {
                if let Some(id) = pick(n) {
                    let before = history.is_disconnected(id).then(|| history.snapshot());
                    history.remove(id);
                    if let Some(before) = before {
                        assert_eq!(history.snapshot(), before, "disconnected remove moved");
                    }
                }
            }
            Op::Toggle(picks) => {
                let ids: Vec<ActionId> = picks.into_iter().filter_map(pick).collect();
                history.toggle(&ids);
            }
            Op::Archive => history.archive(),
            Op::Flush => {
                history.flush();
            }
        }

        // Post-conditions that must always hold:
        let branch = history.to_array();
        assert_eq!(history.size(), branch.len(), "size out of sync with branch");
        assert_eq!(branch.first().copied(), history.root(), "root not first");
        assert_eq!(branch.last().copied(), history.head(), "head not last");
        assert!(history.size() >= 1, "history emptied");

        if archived {
            let root = history.root().expect("root always exists");
            let root_complete = history.action(root).is_some_and(|a| a.is_complete());
            assert!(history.size() <= limit || !root_complete, "retention exceeded");
        }
    }

    history.flush();
    assert!(!history.is_releasing(), "flush left a release outstanding");
    let _ = history.snapshot();
});
