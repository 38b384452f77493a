//! 예외 트레이스 규칙 -- 언어별 상태 전이 규칙과 규칙 집합
//!
//! # 아키텍처
//! - [`types`]: 상태, 언어, 규칙 정의/컴파일 타입
//! - [`catalog`]: 언어별 정적 규칙 테이블과 지연 컴파일된 카탈로그
//! - [`RuleSet`]: 선택된 언어들의 규칙을 출발 상태별로 병합한 전이 테이블
//!
//! # 병합 규칙
//! 여러 언어를 지정하면 지정 순서대로 규칙을 이어 붙이고,
//! 출발 상태마다 `(패턴, 대상 상태)`가 같은 규칙은 처음 것만 남깁니다.
//! 언어를 지정하지 않으면 `all`과 같습니다.

pub mod catalog;
pub mod types;

pub use catalog::Catalog;
pub use types::{Language, Rule, RuleDef, State, supported_languages};

use std::collections::HashMap;

use crate::error::DetectorError;

/// 출발 상태별 후보 규칙 테이블
///
/// 규칙은 프로세스 전역 카탈로그를 참조하므로 생성 비용이 작고,
/// 여러 탐지기가 `Arc`로 공유할 수 있습니다.
#[derive(Debug, Clone)]
pub struct RuleSet {
    transitions: HashMap<State, Vec<&'static Rule>>,
    languages: Vec<Language>,
}

impl RuleSet {
    /// 언어 목록으로 규칙 집합을 만듭니다. 빈 목록은 `all`로 취급합니다.
    pub fn for_languages(languages: &[Language]) -> Result<Self, DetectorError> {
        let catalog = catalog::compiled()?;
        let languages = if languages.is_empty() {
            vec![Language::All]
        } else {
            languages.to_vec()
        };

        let mut transitions: HashMap<State, Vec<&'static Rule>> = HashMap::new();
        for language in &languages {
            for grammar in language.grammars() {
                for rule in catalog.rules(*grammar) {
                    for from in rule.from_states() {
                        let candidates = transitions.entry(*from).or_default();
                        if !candidates.iter().any(|r| r.same_transition(rule)) {
                            candidates.push(rule);
                        }
                    }
                }
            }
        }

        tracing::debug!(
            languages = ?languages,
            states = transitions.len(),
            "built rule set"
        );
        Ok(Self {
            transitions,
            languages,
        })
    }

    /// 언어 이름 목록으로 규칙 집합을 만듭니다 (대소문자 무시, 별칭 허용).
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, DetectorError> {
        let languages = names
            .iter()
            .map(|name| name.as_ref().parse::<Language>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::for_languages(&languages)
    }

    /// 주어진 상태에서 평가할 규칙을 우선순위 순서대로 반환합니다.
    pub fn candidates(&self, state: State) -> &[&'static Rule] {
        self.transitions
            .get(&state)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 주어진 상태에서 줄에 처음 매칭되는 규칙의 대상 상태를 반환합니다.
    pub fn first_match(&self, state: State, line: &str) -> Option<State> {
        self.candidates(state)
            .iter()
            .find(|rule| rule.is_match(line))
            .map(|rule| rule.target())
    }

    /// 구성에 사용된 언어 목록
    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    /// 중복 제거 후 전체 전이 수
    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }
}
