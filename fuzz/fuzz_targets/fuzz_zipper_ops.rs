#![no_main]

use libfuzzer_sys::fuzz_target;
use rewind_core::ZipperTree;

fuzz_target!(|data: &[u8]| {
    // Cap input length to keep prune walks cheap.
    if data.len() > 4096 {
        return;
    }

    let mut tree: ZipperTree<u8> = ZipperTree::with_anchor(0);

    for chunk in data.chunks(2) {
        let arg = chunk.get(1).copied().unwrap_or(0);
        match chunk[0] % 6 {
            0 | 1 => {
                tree.append(arg);
            }
            2 => tree.back(),
            3 => tree.forward(),
            4 => {
                let focus = tree.focus();
                tree.prune(|value| *value < arg);
                assert_eq!(tree.focus(), focus, "prune moved the focus");
            }
            _ => {
                tree.collect_detached();
            }
        }

        // Post-conditions that must always hold:
        let mut walked = 0;
        let mut cursor = tree.focus();
        while let Some(id) = cursor {
            walked += 1;
            cursor = tree.parent(id);
        }
        assert_eq!(tree.size(), walked, "size out of sync with parent walk");
        assert_eq!(
            tree.reduce(|count, _| count + 1, 0usize),
            walked,
            "reduce skipped nodes"
        );
        assert!(tree.allocated() >= tree.size(), "live path not allocated");
    }
});
