//! 트레이스 탐지기 -- 한 줄씩 상태 기계를 진행시켜 줄을 분류합니다.
//!
//! [`TraceDetector`]는 스트림 하나에 대응하며 스레드 간에 공유하지 않습니다.
//! 규칙 집합([`RuleSet`])은 불변이므로 여러 탐지기가 `Arc`로 공유합니다.
//!
//! # 분류 알고리즘
//! 1. 현재 상태가 `Start`가 아니었는지 기록 (`before`)
//! 2. 현재 상태의 후보 규칙을 선언 순서대로 평가, 첫 매칭 규칙으로 전이
//! 3. 매칭이 없으면 `Start`로 복귀
//! 4. 매칭이 없었고 `before`였으면 `Start`에서 한 번 더 평가
//!    (한 줄이 이전 트레이스를 닫고 새 트레이스를 여는 경우)
//! 5. 새 상태가 `Start`가 아닌지(`after`)와 `before`로 분류 결정

use std::fmt;
use std::sync::Arc;

use crate::error::DetectorError;
use crate::rule::{RuleSet, State};

/// 줄 단위 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// 트레이스와 무관한 줄
    NoTrace,
    /// 새 트레이스의 첫 줄
    StartTrace,
    /// 진행 중인 트레이스의 줄
    InsideTrace,
    /// 트레이스가 이 줄에서 끝남
    EndTrace,
}

impl Classification {
    /// 메트릭 레이블용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTrace => "no_trace",
            Self::StartTrace => "start_trace",
            Self::InsideTrace => "inside_trace",
            Self::EndTrace => "end_trace",
        }
    }

    fn from_transition(before: bool, after: bool) -> Self {
        match (before, after) {
            (true, true) => Self::InsideTrace,
            (true, false) => Self::EndTrace,
            (false, true) => Self::StartTrace,
            (false, false) => Self::NoTrace,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 멀티라인 예외 탐지 상태 기계
#[derive(Debug, Clone)]
pub struct TraceDetector {
    state: State,
    rules: Arc<RuleSet>,
}

impl TraceDetector {
    /// 언어 이름 목록으로 탐지기를 생성합니다. 빈 목록은 `all`입니다.
    ///
    /// 알 수 없는 언어 이름은 [`DetectorError::UnknownLanguage`]를 반환합니다.
    pub fn new<S: AsRef<str>>(languages: &[S]) -> Result<Self, DetectorError> {
        let rules = RuleSet::from_names(languages)?;
        Ok(Self::with_rules(Arc::new(rules)))
    }

    /// 공유 규칙 집합으로 탐지기를 생성합니다.
    pub fn with_rules(rules: Arc<RuleSet>) -> Self {
        Self {
            state: State::Start,
            rules,
        }
    }

    /// 한 줄을 소비하고 분류 결과를 반환합니다.
    pub fn update(&mut self, line: &str) -> Classification {
        let before = self.state != State::Start;
        let matched = self.transition(line);
        if !matched && before {
            self.transition(line);
        }
        let after = self.state != State::Start;
        Classification::from_transition(before, after)
    }

    /// 상태를 `Start`로 되돌립니다.
    pub fn reset(&mut self) {
        self.state = State::Start;
    }

    /// 현재 상태
    pub fn state(&self) -> State {
        self.state
    }

    /// 공유 규칙 집합
    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    fn transition(&mut self, line: &str) -> bool {
        match self.rules.first_match(self.state, line) {
            Some(next) => {
                self.state = next;
                true
            }
            None => {
                self.state = State::Start;
                false
            }
        }
    }
}
