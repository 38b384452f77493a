//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 입력 레코드([`Record`])와 출력 레코드([`OutputRecord`])를 정의합니다.
//! 호스트 어댑터는 `(timestamp, Record)` 쌍을 코어에 전달하고,
//! 코어는 [`OutputRecord`]를 내보냅니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 로그 레코드
///
/// 평문 한 줄이거나, 필드 이름 → 값으로 구성된 구조화 레코드(JSON 객체)입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// 평문 레코드 (레코드 전체가 메시지)
    Text(String),
    /// 구조화 레코드
    Structured(Map<String, Value>),
}

impl Record {
    /// 평문 레코드이면 본문을 반환합니다.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// 구조화 레코드이면 필드 맵을 반환합니다.
    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Text(_) => None,
            Self::Structured(fields) => Some(fields),
        }
    }

    /// 구조화 레코드에 해당 필드가 있는지 확인합니다.
    pub fn has_field(&self, name: &str) -> bool {
        self.as_structured()
            .is_some_and(|fields| fields.contains_key(name))
    }

    /// 문자열 필드 값을 반환합니다.
    ///
    /// 필드가 없거나 문자열이 아니면 `None`입니다.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.as_structured()
            .and_then(|fields| fields.get(name))
            .and_then(Value::as_str)
    }
}

impl From<String> for Record {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Record {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::Structured(fields)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(fields) => {
                let json = serde_json::to_string(fields).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// 코어가 내보내는 레코드
///
/// 원본 그대로 통과한 레코드이거나, 여러 줄을 합친 합성 레코드입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// 이벤트 시각 (합성 레코드는 첫 줄의 시각)
    pub timestamp: SystemTime,
    /// 레코드 본문
    pub record: Record,
    /// 스택 트레이스로 판정된 레코드인지 여부
    pub has_trace: bool,
}

impl OutputRecord {
    /// 새 출력 레코드를 생성합니다.
    pub fn new(timestamp: SystemTime, record: Record, has_trace: bool) -> Self {
        Self {
            timestamp,
            record,
            has_trace,
        }
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record)
    }
}
