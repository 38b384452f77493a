//! 트레이스 누적기 -- 한 스트림의 줄을 버퍼링하고 트레이스 단위로 합칩니다.
//!
//! [`TraceAccumulator`]는 레코드에서 메시지를 추출해 [`TraceDetector`]로 분류하고,
//! 분류 결과에 따라 버퍼에 쌓거나 [`TraceSink`]로 내보냅니다.
//!
//! # 버퍼링 정책
//! | 분류 | 버퍼 비어 있음 | 버퍼 있음 |
//! |------|---------------|-----------|
//! | `no_trace` | 즉시 내보냄 | 플러시, 단독으로 다시 플러시 |
//! | `start_trace` | 새 버퍼 시작 | 플러시 후 새 버퍼 시작 |
//! | `inside_trace` | 추가 | 추가 |
//! | `end_trace` | 즉시 내보냄 | 추가 후 플러시 |
//!
//! `max_bytes`는 분류 전에, `max_lines`는 버퍼링 후에 검사하며,
//! 초과 시 강제 플러시(플러시 + 탐지기 리셋)합니다. 데이터는 버리지 않습니다.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use tracefold_core::metrics as m;
use tracefold_core::types::{OutputRecord, Record};

use crate::config::AccumulatorConfig;
use crate::detector::{Classification, TraceDetector};

/// 자동 감지 시 순서대로 확인하는 메시지 필드 이름
pub const DEFAULT_MESSAGE_FIELDS: [&str; 2] = ["message", "log"];

/// 메시지 필드 지정 방식
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageField {
    /// 평문 레코드 (레코드 전체가 메시지)
    #[default]
    None,
    /// 첫 구조화 레코드에서 [`DEFAULT_MESSAGE_FIELDS`] 중 먼저 있는 필드로 결정
    Auto,
    /// 고정된 필드 이름
    Named(String),
}

impl MessageField {
    /// 입력 형식과 설정된 필드 이름으로 지정 방식을 결정합니다.
    ///
    /// 평문 입력이면 `None`, 구조화 입력에서 빈 이름이면 `Auto`입니다.
    pub fn from_config(structured: bool, name: &str) -> Self {
        match (structured, name.trim()) {
            (false, _) => Self::None,
            (true, "") => Self::Auto,
            (true, name) => Self::Named(name.to_owned()),
        }
    }
}

/// 강제 플러시 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    MaxLines,
    MaxBytes,
    Timeout,
    Shutdown,
}

impl FlushReason {
    /// 메트릭 레이블용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxLines => "max_lines",
            Self::MaxBytes => "max_bytes",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// 버퍼 한도와 합치기 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferOptions {
    /// 최대 버퍼 줄 수 (0 = 무제한)
    pub max_lines: usize,
    /// 최대 버퍼 바이트 수 (0 = 무제한)
    pub max_bytes: usize,
    /// 개행으로 끝나지 않는 줄 앞에 개행을 넣어 합침
    pub force_line_breaks: bool,
}

/// 내보낸 레코드를 받는 출력 계약
pub trait TraceSink {
    /// 레코드 하나를 받습니다.
    fn emit(&mut self, record: OutputRecord);
}

impl TraceSink for Vec<OutputRecord> {
    fn emit(&mut self, record: OutputRecord) {
        self.push(record);
    }
}

#[derive(Debug)]
struct BufferedLine {
    timestamp: SystemTime,
    record: Record,
    message: String,
}

/// 한 스트림의 트레이스 누적기
#[derive(Debug)]
pub struct TraceAccumulator {
    detector: TraceDetector,
    message_field: MessageField,
    options: BufferOptions,
    buffer: Vec<BufferedLine>,
    byte_count: usize,
    has_trace: bool,
    buffer_started_at: Option<Instant>,
}

impl TraceAccumulator {
    /// 새 누적기를 생성합니다.
    pub fn new(detector: TraceDetector, message_field: MessageField, options: BufferOptions) -> Self {
        Self {
            detector,
            message_field,
            options,
            buffer: Vec::new(),
            byte_count: 0,
            has_trace: false,
            buffer_started_at: None,
        }
    }

    /// 설정과 탐지기로 누적기를 생성합니다.
    pub fn from_config(config: &AccumulatorConfig, detector: TraceDetector) -> Self {
        Self::new(detector, config.message_field.clone(), config.buffer_options())
    }

    /// 레코드 하나를 처리합니다. 내보낼 레코드는 `sink`로 전달됩니다.
    pub fn push(&mut self, timestamp: SystemTime, record: Record, sink: &mut impl TraceSink) {
        let Some(message) = self.extract_message(&record).map(str::to_owned) else {
            metrics::counter!(m::DETECTOR_MISSING_MESSAGE_TOTAL).increment(1);
            tracing::trace!("record has no message, passing through");
            self.detector.reset();
            self.flush(sink);
            self.emit(sink, OutputRecord::new(timestamp, record, false));
            return;
        };

        if self.options.max_bytes > 0 && self.byte_count + message.len() > self.options.max_bytes {
            self.force_flush(FlushReason::MaxBytes, sink);
        }

        let classification = self.detector.update(&message);
        metrics::counter!(
            m::DETECTOR_LINES_TOTAL,
            m::LABEL_CLASSIFICATION => classification.as_str()
        )
        .increment(1);

        self.update_buffer(classification, timestamp, record, message, sink);

        if self.options.max_lines > 0 && self.buffer.len() == self.options.max_lines {
            self.force_flush(FlushReason::MaxLines, sink);
        }
    }

    /// 버퍼를 하나의 레코드로 내보냅니다. 비어 있으면 아무것도 하지 않습니다.
    ///
    /// 한 줄이면 원본 레코드를 그대로, 여러 줄이면 메시지를 이어 붙인
    /// 합성 레코드를 첫 줄의 시각으로 내보냅니다.
    pub fn flush(&mut self, sink: &mut impl TraceSink) {
        let mut lines = std::mem::take(&mut self.buffer);
        self.byte_count = 0;
        self.buffer_started_at = None;

        if lines.len() > 1 {
            let combined = join_messages(&lines, self.options.force_line_breaks);
            let line_count = lines.len();
            let first = lines.remove(0);
            let record = match (&self.message_field, first.record) {
                (MessageField::Named(field), Record::Structured(mut fields)) => {
                    fields.insert(field.clone(), Value::String(combined));
                    Record::Structured(fields)
                }
                _ => Record::Text(combined),
            };
            metrics::counter!(m::DETECTOR_TRACES_COMBINED_TOTAL).increment(1);
            tracing::trace!(lines = line_count, "flushing combined trace");
            self.emit(sink, OutputRecord::new(first.timestamp, record, self.has_trace));
        } else if let Some(only) = lines.pop() {
            self.emit(sink, OutputRecord::new(only.timestamp, only.record, self.has_trace));
        }
    }

    /// 버퍼를 내보내고 탐지기를 초기 상태로 되돌립니다.
    pub fn force_flush(&mut self, reason: FlushReason, sink: &mut impl TraceSink) {
        if !self.buffer.is_empty() {
            metrics::counter!(m::DETECTOR_FORCED_FLUSHES_TOTAL, m::LABEL_REASON => reason.as_str())
                .increment(1);
            tracing::debug!(
                reason = reason.as_str(),
                lines = self.buffer.len(),
                bytes = self.byte_count,
                "forcing flush"
            );
        }
        self.flush(sink);
        self.detector.reset();
    }

    /// 버퍼가 `timeout`보다 오래 열려 있었는지 확인합니다.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.buffer_started_at
            .is_some_and(|started| now.saturating_duration_since(started) > timeout)
    }

    /// 현재 버퍼가 열린 시각 (비어 있으면 `None`)
    pub fn buffer_started_at(&self) -> Option<Instant> {
        self.buffer_started_at
    }

    /// 버퍼된 줄 수
    pub fn buffered_lines(&self) -> usize {
        self.buffer.len()
    }

    /// 버퍼된 메시지 바이트 수
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 현재 메시지 필드 지정 (자동 감지 후에는 `Named`)
    pub fn message_field(&self) -> &MessageField {
        &self.message_field
    }

    pub fn detector(&self) -> &TraceDetector {
        &self.detector
    }

    fn extract_message<'r>(&mut self, record: &'r Record) -> Option<&'r str> {
        if self.message_field == MessageField::Auto {
            if let Some(name) = DEFAULT_MESSAGE_FIELDS
                .iter()
                .find(|name| record.has_field(name))
            {
                tracing::debug!(field = *name, "resolved message field");
                self.message_field = MessageField::Named((*name).to_owned());
            }
        }

        match &self.message_field {
            MessageField::None => record.as_text(),
            MessageField::Auto => None,
            MessageField::Named(field) => record.field_str(field),
        }
    }

    fn update_buffer(
        &mut self,
        classification: Classification,
        timestamp: SystemTime,
        record: Record,
        message: String,
        sink: &mut impl TraceSink,
    ) {
        match classification {
            Classification::NoTrace | Classification::EndTrace if self.buffer.is_empty() => {
                let has_trace = classification == Classification::EndTrace;
                self.emit(sink, OutputRecord::new(timestamp, record, has_trace));
            }
            Classification::InsideTrace => {
                self.has_trace = true;
                self.append(timestamp, record, message);
            }
            Classification::EndTrace => {
                self.has_trace = true;
                self.append(timestamp, record, message);
                self.flush(sink);
            }
            Classification::NoTrace => {
                self.flush(sink);
                self.has_trace = false;
                self.append(timestamp, record, message);
                self.flush(sink);
            }
            Classification::StartTrace => {
                self.flush(sink);
                self.has_trace = true;
                self.append(timestamp, record, message);
            }
        }
    }

    fn append(&mut self, timestamp: SystemTime, record: Record, message: String) {
        if self.buffer.is_empty() {
            self.buffer_started_at = Some(Instant::now());
        }
        self.byte_count += message.len();
        self.buffer.push(BufferedLine {
            timestamp,
            record,
            message,
        });
    }

    fn emit(&self, sink: &mut impl TraceSink, record: OutputRecord) {
        metrics::counter!(m::DETECTOR_RECORDS_EMITTED_TOTAL).increment(1);
        sink.emit(record);
    }
}

fn join_messages(lines: &[BufferedLine], force_line_breaks: bool) -> String {
    let capacity = lines.iter().map(|line| line.message.len() + 1).sum();
    let mut combined = String::with_capacity(capacity);
    for (idx, line) in lines.iter().enumerate() {
        if force_line_breaks && idx > 0 && !line.message.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&line.message);
    }
    combined
}
