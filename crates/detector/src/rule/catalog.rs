//! 언어별 규칙 카탈로그
//!
//! 각 문법은 [`RuleDef`]의 정적 테이블이며, 테이블 안의 선언 순서가 곧 매칭 우선순위입니다.
//! 컴파일된 카탈로그는 프로세스당 한 번 지연 생성되며([`compiled`]),
//! 패턴 컴파일 실패는 패닉이 아닌 [`DetectorError::Catalog`]로 보고됩니다.
//!
//! 빈 줄 규칙은 `\A`로 고정합니다. 멀티라인 모드의 `^`는 줄 끝 개행 뒤에서도
//! 매칭되므로 `^$`는 모든 개행 종료 줄에 매칭되어 버립니다.

use once_cell::sync::Lazy;

use super::types::{Language, Rule, RuleDef, State};
use crate::error::DetectorError;

const fn rule(from: &'static [State], pattern: &'static str, to: State) -> RuleDef {
    RuleDef { from, pattern, to }
}

/// Java, JavaScript(V8), C#
const JAVA_RULES: &[RuleDef] = &[
    rule(
        &[State::Start, State::JavaStartException],
        r"(?:Exception|Error|Throwable|V8 errors stack trace)[:\r\n]",
        State::JavaAfterException,
    ),
    rule(
        &[State::JavaAfterException],
        r"^[\t ]*nested exception is:[\t ]*",
        State::JavaStartException,
    ),
    rule(
        &[State::JavaAfterException],
        r"\A[\r\n]*$",
        State::JavaAfterException,
    ),
    rule(
        &[State::JavaAfterException, State::Java],
        r"^[\t ]+(?:eval )?at ",
        State::Java,
    ),
    // C# 중첩 예외 구분선
    rule(
        &[State::JavaAfterException, State::Java],
        r"^[\t ]*--- End of inner exception stack trace ---$",
        State::Java,
    ),
    // C# async 재던지기 구분선
    rule(
        &[State::JavaAfterException, State::Java],
        r"^--- End of stack trace from previous (?x:
           )location where exception was thrown ---$",
        State::Java,
    ),
    rule(
        &[State::JavaAfterException, State::Java],
        r"^[\t ]*(?:Caused by|Suppressed):",
        State::JavaAfterException,
    ),
    rule(
        &[State::JavaAfterException, State::Java],
        r"^[\t ]*... \d+ (?:more|common frames omitted)",
        State::Java,
    ),
];

const PYTHON_RULES: &[RuleDef] = &[
    rule(
        &[State::Start],
        r"^Traceback \(most recent call last\):$",
        State::Python,
    ),
    rule(&[State::Python], r"^[\t ]+File ", State::PythonCode),
    rule(&[State::PythonCode], r"[^\t ]", State::Python),
    // 예외 요약 줄에서 트레이스 종료
    rule(
        &[State::Python],
        r"^(?:[^\s.():]+\.)*[^\s.():]+:",
        State::Start,
    ),
];

const PHP_RULES: &[RuleDef] = &[
    rule(
        &[State::Start],
        r"(?x)
        (?:PHP\ (?:Notice|Parse\ error|Fatal\ error|Warning):)|   # runtime diagnostics
        (?:exception\ '[^']+'\ with\ message\ ')                  # uncaught exception",
        State::PhpStackBegin,
    ),
    rule(&[State::PhpStackBegin], r"^Stack trace:", State::PhpStackFrames),
    rule(&[State::PhpStackFrames], r"^#\d", State::PhpStackFrames),
    rule(&[State::PhpStackFrames], r"^\s+thrown in ", State::Start),
];

const GO_RULES: &[RuleDef] = &[
    rule(&[State::Start], r"\bpanic: ", State::GoAfterPanic),
    // net/http 핸들러 패닉은 바로 goroutine 덤프가 이어짐
    rule(&[State::Start], r"http: panic serving", State::GoGoroutine),
    rule(
        &[State::GoAfterPanic, State::GoAfterSignal, State::GoFrame1],
        r"\A$",
        State::GoGoroutine,
    ),
    rule(&[State::GoAfterPanic], r"^\[signal ", State::GoAfterSignal),
    rule(
        &[State::GoGoroutine],
        r"^goroutine \d+ \[[^\]]+\]:$",
        State::GoFrame1,
    ),
    rule(
        &[State::GoFrame1],
        r"^(?:[^\s.:]+\.)*[^\s.():]+\(|^created by ",
        State::GoFrame2,
    ),
    rule(&[State::GoFrame2], r"^\s", State::GoFrame1),
];

const RUBY_RULES: &[RuleDef] = &[
    rule(&[State::Start], r"Error \(.*\):$", State::RubyBeforeRailsTrace),
    rule(&[State::RubyBeforeRailsTrace], r"^  $", State::Ruby),
    rule(
        &[State::RubyBeforeRailsTrace],
        r"^[\t ]+.*?\.rb:\d+:in `",
        State::Ruby,
    ),
    rule(&[State::Ruby], r"^[\t ]+.*?\.rb:\d+:in `", State::Ruby),
];

const DART_FRAME: &str = r"^#\d+\s+.+?\(.+?\)$";

const DART_RULES: &[RuleDef] = &[
    rule(&[State::Start], r"^Unhandled exception:$", State::DartExc),
    rule(&[State::DartExc], r"^Instance of", State::DartStack),
    rule(&[State::DartExc], r"^Exception", State::DartStack),
    rule(&[State::DartExc], r"^Bad state", State::DartStack),
    rule(
        &[State::DartExc],
        r"^IntegerDivisionByZeroException",
        State::DartStack,
    ),
    rule(&[State::DartExc], r"^Invalid argument", State::DartStack),
    rule(&[State::DartExc], r"^RangeError", State::DartStack),
    rule(&[State::DartExc], r"^Assertion failed", State::DartStack),
    rule(&[State::DartExc], r"^Cannot instantiate", State::DartStack),
    rule(&[State::DartExc], r"^Reading static variable", State::DartStack),
    rule(&[State::DartExc], r"^UnimplementedError", State::DartStack),
    rule(&[State::DartExc], r"^Unsupported operation", State::DartStack),
    rule(&[State::DartExc], r"^Concurrent modification", State::DartStack),
    rule(&[State::DartExc], r"^Out of Memory", State::DartStack),
    rule(&[State::DartExc], r"^Stack Overflow", State::DartStack),
    // 타입 에러: 소스 위치, 소스 줄, 캐럿, 빈 줄 두 개
    rule(&[State::DartExc], r"^'.+?':.+?$", State::DartTypeErr1),
    rule(&[State::DartTypeErr1], DART_FRAME, State::DartStack),
    rule(&[State::DartTypeErr1], r"^.+?$", State::DartTypeErr2),
    rule(&[State::DartTypeErr2], r"^.*?\^.*?$", State::DartTypeErr3),
    rule(&[State::DartTypeErr3], r"\A$", State::DartTypeErr4),
    rule(&[State::DartTypeErr4], r"\A$", State::DartStack),
    rule(&[State::DartExc], r"^FormatException", State::DartFormatErr1),
    rule(&[State::DartFormatErr1], DART_FRAME, State::DartStack),
    rule(&[State::DartFormatErr1], r"^.", State::DartFormatErr2),
    rule(&[State::DartFormatErr2], r"^.*?\^", State::DartFormatErr3),
    rule(&[State::DartFormatErr3], r"\A$", State::DartStack),
    rule(&[State::DartExc], r"^NoSuchMethodError:", State::DartMethodErr1),
    rule(&[State::DartMethodErr1], r"^Receiver:", State::DartMethodErr2),
    rule(&[State::DartMethodErr2], r"^Tried calling:", State::DartMethodErr3),
    rule(&[State::DartMethodErr3], r"^Found:", State::DartStack),
    rule(&[State::DartMethodErr3], DART_FRAME, State::DartStack),
    rule(&[State::DartStack], DART_FRAME, State::DartStack),
    rule(
        &[State::DartStack],
        r"^<asynchronous suspension>$",
        State::DartStack,
    ),
];

/// 단일 문법의 규칙 정의를 반환합니다.
///
/// `Language::All`은 문법이 아니므로 빈 슬라이스를 반환합니다.
/// 호출자는 [`Language::grammars`]로 먼저 펼쳐야 합니다.
pub fn definitions(language: Language) -> &'static [RuleDef] {
    match language {
        Language::Java => JAVA_RULES,
        Language::Python => PYTHON_RULES,
        Language::Php => PHP_RULES,
        Language::Go => GO_RULES,
        Language::Ruby => RUBY_RULES,
        Language::Dart => DART_RULES,
        Language::All => &[],
    }
}

/// 컴파일된 규칙 카탈로그
#[derive(Debug)]
pub struct Catalog {
    grammars: Vec<(Language, Vec<Rule>)>,
}

impl Catalog {
    fn compile() -> Result<Self, String> {
        let mut grammars = Vec::with_capacity(Language::GRAMMARS.len());
        for language in Language::GRAMMARS {
            let rules = definitions(language)
                .iter()
                .map(|def| {
                    Rule::compile(def).map_err(|e| {
                        format!("{language} rule /{}/ failed to compile: {e}", def.pattern)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            grammars.push((language, rules));
        }
        Ok(Self { grammars })
    }

    /// 단일 문법의 컴파일된 규칙을 선언 순서대로 반환합니다.
    pub fn rules(&self, language: Language) -> &[Rule] {
        self.grammars
            .iter()
            .find(|(lang, _)| *lang == language)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }

    /// 전체 규칙 수
    pub fn rule_count(&self) -> usize {
        self.grammars.iter().map(|(_, rules)| rules.len()).sum()
    }
}

static CATALOG: Lazy<Result<Catalog, String>> = Lazy::new(|| {
    let catalog = Catalog::compile();
    match &catalog {
        Ok(c) => tracing::debug!(rules = c.rule_count(), "compiled rule catalog"),
        Err(reason) => tracing::error!(reason = %reason, "failed to compile rule catalog"),
    }
    catalog
});

/// 프로세스 전역 카탈로그를 반환합니다 (최초 호출 시 컴파일).
pub fn compiled() -> Result<&'static Catalog, DetectorError> {
    CATALOG
        .as_ref()
        .map_err(|reason| DetectorError::Catalog(reason.clone()))
}
