#![no_main]

use libfuzzer_sys::fuzz_target;
use rewind_runtime::HistoryConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing must never panic; accepted configs always have a usable limit.
    if let Ok(config) = HistoryConfig::from_json_str(text) {
        assert!(config.limit() >= 1);
        assert_eq!(config.validate().is_empty(), config.max_history > 0);
    }
});
