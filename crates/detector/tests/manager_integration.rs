//! 통합 테스트 -- 누적기 매니저 end-to-end 시나리오
//!
//! 구조화 레코드를 매니저에 넣고, 정지 후 출력 채널을 비워 결과 묶음을 검증합니다.

use std::time::{Duration, SystemTime};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use tracefold_core::pipeline::{HealthStatus, Pipeline};
use tracefold_core::types::{OutputRecord, Record};
use tracefold_detector::{
    AccumulatorConfig, AccumulatorManager, AccumulatorManagerBuilder, MessageField, StreamKey,
};

const ARBITRARY: &str = "This line is not an exception.";
const JAVA_EXC: &str = "SomeException: foo\n  at bar\nCaused by: org.AnotherException\n  at bar2\n  at bar3\n";
const PYTHON_EXC: &str = "Traceback (most recent call last):\n  File \"/base/data/home/runtimes/python27/python27_lib/versions/third_party/webapp2-2.5.2/webapp2.py\", line 1535, in __call__\n    rv = self.handle_exception(request, response, e)\nException: ('spam', 'eggs')\n";

fn lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn record(message: &str, count: usize, stream: Option<&str>) -> Record {
    let mut value = json!({ "message": message, "count": count });
    if let (Some(stream), Value::Object(fields)) = (stream, &mut value) {
        fields.insert("stream".to_owned(), Value::String(stream.to_owned()));
    }
    match value {
        Value::Object(fields) => Record::Structured(fields),
        other => panic!("expected object, got {other}"),
    }
}

fn config() -> AccumulatorConfig {
    AccumulatorConfig {
        message_field: MessageField::Auto,
        ..Default::default()
    }
}

async fn started(config: AccumulatorConfig) -> (AccumulatorManager, mpsc::Receiver<OutputRecord>) {
    let (mut manager, rx) = AccumulatorManagerBuilder::new()
        .config(config)
        .build()
        .unwrap();
    manager.start().await.unwrap();
    (manager, rx.unwrap())
}

/// 메시지를 줄 단위로 `test` 소스에 넣습니다.
async fn feed(manager: &AccumulatorManager, messages: &[&str]) {
    let mut count = 0;
    for message in messages {
        for line in lines(message) {
            manager
                .process("test", SystemTime::now(), record(line, count, None))
                .await
                .unwrap();
            count += 1;
        }
    }
}

/// 매니저를 정지하고 출력 채널에 남은 메시지를 모두 꺼냅니다.
async fn stop_and_drain(
    mut manager: AccumulatorManager,
    mut rx: mpsc::Receiver<OutputRecord>,
) -> Vec<String> {
    manager.stop().await.unwrap();
    let mut messages = Vec::new();
    while let Ok(output) = rx.try_recv() {
        messages.push(output.record.field_str("message").unwrap_or_default().to_owned());
    }
    messages
}

#[tokio::test]
async fn test_exception_detection() {
    let (manager, rx) = started(config()).await;
    feed(&manager, &[ARBITRARY, JAVA_EXC, ARBITRARY]).await;

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(messages, vec![ARBITRARY.to_owned(), format!("{JAVA_EXC}{ARBITRARY}")]);
}

#[tokio::test]
async fn test_single_language_config() {
    let (manager, rx) = started(AccumulatorConfig {
        languages: vec!["java".to_owned()],
        ..config()
    })
    .await;
    feed(&manager, &[ARBITRARY, JAVA_EXC, PYTHON_EXC]).await;

    let python = lines(PYTHON_EXC);
    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(
        messages,
        vec![
            ARBITRARY.to_owned(),
            format!("{JAVA_EXC}{}", python[0]),
            python[1].to_owned(),
            python[2].to_owned(),
            python[3].to_owned(),
        ]
    );
}

#[tokio::test]
async fn test_multi_language_config() {
    let (manager, rx) = started(AccumulatorConfig {
        languages: vec!["python".to_owned(), "java".to_owned()],
        ..config()
    })
    .await;
    feed(&manager, &[ARBITRARY, JAVA_EXC, PYTHON_EXC]).await;

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(
        messages,
        vec![ARBITRARY.to_owned(), format!("{JAVA_EXC}{PYTHON_EXC}")]
    );
}

#[tokio::test]
async fn test_max_lines_limit() {
    let (manager, rx) = started(AccumulatorConfig {
        max_lines: 2,
        ..config()
    })
    .await;
    feed(&manager, &[PYTHON_EXC, JAVA_EXC]).await;

    let p = lines(PYTHON_EXC);
    let j = lines(JAVA_EXC);
    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(
        messages,
        vec![
            format!("{}{}", p[0], p[1]),
            p[2].to_owned(),
            format!("{}{}", p[3], j[0]),
            j[1].to_owned(),
            format!("{}{}", j[2], j[3]),
            j[4].to_owned(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_flush_after_timeout() {
    let (manager, rx) = started(AccumulatorConfig {
        flush_timeout: Some(Duration::from_secs(1)),
        ..config()
    })
    .await;

    feed(&manager, &[JAVA_EXC]).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    feed(&manager, &["  at x\n  at y\n"]).await;

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(
        messages,
        vec![JAVA_EXC.to_owned(), "  at x\n".to_owned(), "  at y\n".to_owned()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_open_trace_while_sweep_is_running() {
    let (manager, rx) = started(AccumulatorConfig {
        flush_timeout: Some(Duration::from_secs(60)),
        ..config()
    })
    .await;

    feed(&manager, &["SomeException: foo\n  at bar\n"]).await;
    // sweep ticks every 6s; the trace is not yet stale
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.stream_count().await, 1);

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(messages, vec!["SomeException: foo\n  at bar\n".to_owned()]);
}

#[tokio::test]
async fn test_no_flush_without_timeout() {
    let (manager, rx) = started(config()).await;

    feed(&manager, &[JAVA_EXC]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    feed(&manager, &["  at x\n  at y\n"]).await;

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(messages, vec![format!("{JAVA_EXC}  at x\n  at y\n")]);
}

#[tokio::test]
async fn test_separate_streams() {
    let (manager, rx) = started(AccumulatorConfig {
        stream_field: Some("stream".to_owned()),
        ..config()
    })
    .await;

    let j = lines(JAVA_EXC);
    let p = lines(PYTHON_EXC);
    let mut inputs: Vec<(&str, &str)> = vec![(j[0], "java"), (p[0], "python"), (p[1], "python")];
    inputs.extend(j[1..].iter().map(|line| (*line, "java")));
    inputs.extend(j.iter().map(|line| (*line, "java")));
    inputs.extend([(p[2], "python"), (p[3], "python"), ("something else", "java")]);

    for (count, (line, stream)) in inputs.into_iter().enumerate() {
        manager
            .process("test", SystemTime::now(), record(line, count, Some(stream)))
            .await
            .unwrap();
    }

    assert_eq!(
        manager.stream_keys().await,
        vec![StreamKey::new("test", "java"), StreamKey::new("test", "python")]
    );

    let messages = stop_and_drain(manager, rx).await;
    assert_eq!(
        messages,
        vec![
            PYTHON_EXC.to_owned(),
            format!("{JAVA_EXC}{JAVA_EXC}something else"),
        ]
    );
}

#[tokio::test]
async fn test_combined_record_keeps_first_record_fields() {
    let (manager, mut rx) = started(config()).await;
    feed(&manager, &[JAVA_EXC, ARBITRARY]).await;

    let output = rx.recv().await.unwrap();
    assert!(output.has_trace);
    let fields = output.record.as_structured().unwrap();
    assert_eq!(fields.get("count"), Some(&json!(0)));
    assert_eq!(
        output.record.field_str("message"),
        Some(format!("{JAVA_EXC}{ARBITRARY}").as_str())
    );
}

#[tokio::test]
async fn test_sources_are_independent() {
    let (manager, rx) = started(config()).await;
    let j = lines(JAVA_EXC);

    for (count, line) in j.iter().enumerate() {
        let source = if count % 2 == 0 { "a" } else { "b" };
        manager
            .process(source, SystemTime::now(), record(line, count, None))
            .await
            .unwrap();
    }
    assert_eq!(manager.stream_count().await, 2);

    // "a"에는 예외 시작 줄과 Caused by 줄이 들어가므로 하나의 트레이스로 묶입니다.
    let messages = stop_and_drain(manager, rx).await;
    assert!(messages.contains(&format!("{}{}{}", j[0], j[2], j[4])));
}

#[tokio::test]
async fn test_lifecycle_and_health() {
    let (mut manager, _rx) = AccumulatorManagerBuilder::new()
        .config(config())
        .build()
        .unwrap();

    assert!(matches!(manager.health_check().await, HealthStatus::Unhealthy(_)));
    assert!(manager.stop().await.is_err());

    manager.start().await.unwrap();
    assert!(manager.health_check().await.is_healthy());
    assert!(manager.start().await.is_err());

    manager.stop().await.unwrap();
    assert_eq!(manager.state_name(), "stopped");
    assert!(matches!(manager.health_check().await, HealthStatus::Unhealthy(_)));
}

#[tokio::test]
async fn test_closed_output_channel_reports_error_and_degraded() {
    let (manager, rx) = started(config()).await;
    drop(rx);

    let result = manager
        .process("test", SystemTime::now(), record(ARBITRARY, 0, None))
        .await;
    assert!(result.is_err());
    assert!(matches!(manager.health_check().await, HealthStatus::Degraded(_)));
}
