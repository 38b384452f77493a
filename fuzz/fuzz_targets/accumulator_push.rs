#![no_main]

use std::time::SystemTime;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use tracefold_core::types::{OutputRecord, Record};
use tracefold_detector::{BufferOptions, MessageField, TraceAccumulator, TraceDetector};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    max_lines: u8,
    max_bytes: u16,
    lines: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(detector) = TraceDetector::new(&["all"]) else {
        return;
    };
    let options = BufferOptions {
        max_lines: usize::from(input.max_lines),
        max_bytes: usize::from(input.max_bytes),
        force_line_breaks: false,
    };
    let mut accumulator = TraceAccumulator::new(detector, MessageField::None, options);
    let mut out: Vec<OutputRecord> = Vec::new();

    // 입력 줄 수 제한 (성능)
    let lines: Vec<&String> = input.lines.iter().take(256).collect();
    for line in &lines {
        accumulator.push(SystemTime::UNIX_EPOCH, Record::from(line.as_str()), &mut out);
        if options.max_lines > 0 {
            assert!(accumulator.buffered_lines() < options.max_lines);
        }
    }
    accumulator.flush(&mut out);

    // 합쳐진 결과는 입력을 순서대로 이어 붙인 것과 같아야 함
    let expected: String = lines.iter().map(|line| line.as_str()).collect();
    let actual: String = out.iter().map(|record| record.record.to_string()).collect();
    assert_eq!(actual, expected);
});
