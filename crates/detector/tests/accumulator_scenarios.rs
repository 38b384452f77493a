//! 통합 테스트 -- 누적기 버퍼링 시나리오
//!
//! 메시지 묶음마다 명시적으로 `flush()`를 호출하면서 내보낸 레코드를 검증합니다.

use std::time::SystemTime;

use serde_json::{Map, Value};

use tracefold_core::types::{OutputRecord, Record};
use tracefold_detector::{BufferOptions, MessageField, TraceAccumulator, TraceDetector};

macro_rules! fixture {
    ($name:literal) => {
        include_str!(concat!("fixtures/", $name, ".txt"))
    };
}

const JAVA_EXC_PART1: &str = fixture!("java_exc_part1");
const JAVA_EXC_PART2: &str = fixture!("java_exc_part2");
const PYTHON_EXC: &str = fixture!("python_exc");
const GO_EXC: &str = fixture!("go_exc");
const ARBITRARY_TEXT: &str = fixture!("arbitrary_text");

fn java_exc() -> String {
    format!("{JAVA_EXC_PART1}{JAVA_EXC_PART2}")
}

fn lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_owned).collect()
}

fn accumulator(
    languages: &[&str],
    field: MessageField,
    options: BufferOptions,
) -> TraceAccumulator {
    TraceAccumulator::new(TraceDetector::new(languages).unwrap(), field, options)
}

/// 각 메시지를 줄 단위로 넣고 메시지마다 flush 합니다.
fn feed_lines(acc: &mut TraceAccumulator, messages: &[&str]) -> Vec<OutputRecord> {
    let mut out = Vec::new();
    for message in messages {
        for line in message.split_inclusive('\n') {
            acc.push(SystemTime::UNIX_EPOCH, Record::from(line), &mut out);
        }
        acc.flush(&mut out);
    }
    out
}

fn feed_json(acc: &mut TraceAccumulator, field: &str, messages: &[&str]) -> Vec<OutputRecord> {
    let mut out = Vec::new();
    for message in messages {
        for line in message.split_inclusive('\n') {
            let mut fields = Map::new();
            fields.insert(field.to_owned(), Value::String(line.to_owned()));
            acc.push(SystemTime::UNIX_EPOCH, Record::Structured(fields), &mut out);
        }
        acc.flush(&mut out);
    }
    out
}

fn texts(out: &[OutputRecord]) -> Vec<String> {
    out.iter().map(|r| r.record.to_string()).collect()
}

fn field_values(out: &[OutputRecord], field: &str) -> Vec<String> {
    out.iter()
        .map(|r| r.record.field_str(field).unwrap_or_default().to_owned())
        .collect()
}

#[test]
fn test_buffer_mixed_languages() {
    let java = java_exc();
    let mut acc = accumulator(&["all"], MessageField::None, BufferOptions::default());
    let out = feed_lines(&mut acc, &[&java, ARBITRARY_TEXT, PYTHON_EXC, GO_EXC]);

    let mut expected = vec![java.clone()];
    expected.extend(lines(ARBITRARY_TEXT));
    expected.extend([PYTHON_EXC.to_owned(), GO_EXC.to_owned()]);
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_buffer_single_language() {
    let java = java_exc();
    let mut acc = accumulator(&["go"], MessageField::None, BufferOptions::default());
    let out = feed_lines(&mut acc, &[&java, ARBITRARY_TEXT, GO_EXC]);

    let mut expected = lines(&java);
    expected.extend(lines(ARBITRARY_TEXT));
    expected.push(GO_EXC.to_owned());
    assert_eq!(texts(&out), expected);
    assert!(out.last().is_some_and(|r| r.has_trace));
    assert!(out[..out.len() - 1].iter().all(|r| !r.has_trace));
}

#[test]
fn test_buffer_some_languages_not_configured() {
    let java = java_exc();
    let mut acc = accumulator(&["python"], MessageField::None, BufferOptions::default());
    let out = feed_lines(&mut acc, &[&java, PYTHON_EXC, GO_EXC]);

    let mut expected = lines(&java);
    expected.push(PYTHON_EXC.to_owned());
    expected.extend(lines(GO_EXC));
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_buffer_no_languages_configured_match() {
    let java = java_exc();
    let mut acc = accumulator(&["ruby"], MessageField::None, BufferOptions::default());
    let out = feed_lines(&mut acc, &[&java, PYTHON_EXC, GO_EXC]);

    let mut expected = lines(&java);
    expected.extend(lines(PYTHON_EXC));
    expected.extend(lines(GO_EXC));
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_json_user_defined_field() {
    let mut acc = accumulator(
        &["all"],
        MessageField::Named("mydata".to_owned()),
        BufferOptions::default(),
    );
    let out = feed_json(&mut acc, "mydata", &[PYTHON_EXC, ARBITRARY_TEXT, GO_EXC]);

    let mut expected = vec![PYTHON_EXC.to_owned()];
    expected.extend(lines(ARBITRARY_TEXT));
    expected.push(GO_EXC.to_owned());
    assert_eq!(field_values(&out, "mydata"), expected);
}

#[test]
fn test_json_default_fields() {
    for field in ["message", "log"] {
        let mut acc = accumulator(&["all"], MessageField::Auto, BufferOptions::default());
        let out = feed_json(&mut acc, field, &[PYTHON_EXC, ARBITRARY_TEXT, GO_EXC]);

        let mut expected = vec![PYTHON_EXC.to_owned()];
        expected.extend(lines(ARBITRARY_TEXT));
        expected.push(GO_EXC.to_owned());
        assert_eq!(field_values(&out, field), expected, "field {field}");
        assert_eq!(acc.message_field(), &MessageField::Named(field.to_owned()));
    }
}

#[test]
fn test_json_wrong_or_undetectable_field_passes_lines_through() {
    for configured in [MessageField::Named("doesnotexist".to_owned()), MessageField::Auto] {
        let mut acc = accumulator(&["all"], configured.clone(), BufferOptions::default());
        let out = feed_json(&mut acc, "mydata", &[PYTHON_EXC, ARBITRARY_TEXT, GO_EXC]);

        let mut expected = lines(PYTHON_EXC);
        expected.extend(lines(ARBITRARY_TEXT));
        expected.extend(lines(GO_EXC));
        assert_eq!(field_values(&out, "mydata"), expected, "{configured:?}");
        assert!(out.iter().all(|r| !r.has_trace));
    }
}

#[test]
fn test_max_lines_limit() {
    let max_lines = lines(JAVA_EXC_PART1).len();
    let mut acc = accumulator(
        &["all"],
        MessageField::None,
        BufferOptions {
            max_lines,
            ..Default::default()
        },
    );
    let out = feed_lines(&mut acc, &[&java_exc()]);

    let mut expected = vec![JAVA_EXC_PART1.to_owned()];
    expected.extend(lines(JAVA_EXC_PART2));
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_high_max_bytes_limit() {
    let max_bytes = JAVA_EXC_PART1.len() + lines(JAVA_EXC_PART2)[0].len() - 1;
    let mut acc = accumulator(
        &["all"],
        MessageField::None,
        BufferOptions {
            max_bytes,
            ..Default::default()
        },
    );
    let out = feed_lines(&mut acc, &[&java_exc()]);

    let mut expected = vec![JAVA_EXC_PART1.to_owned()];
    expected.extend(lines(JAVA_EXC_PART2));
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_low_max_bytes_limit() {
    let max_bytes = JAVA_EXC_PART1.len();
    let mut acc = accumulator(
        &["all"],
        MessageField::None,
        BufferOptions {
            max_bytes,
            ..Default::default()
        },
    );
    let out = feed_lines(&mut acc, &[&java_exc()]);

    let mut expected = vec![JAVA_EXC_PART1.to_owned()];
    expected.extend(lines(JAVA_EXC_PART2));
    assert_eq!(texts(&out), expected);
}

#[test]
fn test_two_line_java_scenario() {
    let mut acc = accumulator(&["java"], MessageField::None, BufferOptions::default());
    let out = feed_lines(&mut acc, &["Exception: foo\n  at bar\n"]);
    assert_eq!(texts(&out), vec!["Exception: foo\n  at bar\n"]);
    assert!(out[0].has_trace);
}
