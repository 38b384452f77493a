#![no_main]

use libfuzzer_sys::fuzz_target;
use tracefold_detector::{Classification, State, TraceDetector};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut detector) = TraceDetector::new(&["all"]) else {
        return;
    };

    for line in text.split_inclusive('\n') {
        let action = detector.update(line);
        // 트레이스 밖에서 끝난 분류면 상태는 반드시 시작 상태
        if matches!(action, Classification::NoTrace | Classification::EndTrace) {
            assert_eq!(detector.state(), State::Start);
        }
    }
});
