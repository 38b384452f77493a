//! 규칙 데이터 타입
//!
//! 상태 기계의 상태([`State`]), 언어 식별자([`Language`]),
//! 정적 규칙 정의([`RuleDef`])와 컴파일된 규칙([`Rule`])을 정의합니다.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::DetectorError;

/// 탐지 상태 기계의 상태
///
/// `Start`만 언어 중립 상태이며, 나머지는 각 언어 문법에 속합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// 초기 상태 (트레이스 밖)
    Start,
    JavaStartException,
    JavaAfterException,
    Java,
    Python,
    PythonCode,
    PhpStackBegin,
    PhpStackFrames,
    GoAfterPanic,
    GoAfterSignal,
    GoGoroutine,
    GoFrame1,
    GoFrame2,
    RubyBeforeRailsTrace,
    Ruby,
    DartExc,
    DartStack,
    DartTypeErr1,
    DartTypeErr2,
    DartTypeErr3,
    DartTypeErr4,
    DartFormatErr1,
    DartFormatErr2,
    DartFormatErr3,
    DartMethodErr1,
    DartMethodErr2,
    DartMethodErr3,
}

impl State {
    /// 로그/메트릭용 snake_case 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::JavaStartException => "java_start_exception",
            Self::JavaAfterException => "java_after_exception",
            Self::Java => "java",
            Self::Python => "python",
            Self::PythonCode => "python_code",
            Self::PhpStackBegin => "php_stack_begin",
            Self::PhpStackFrames => "php_stack_frames",
            Self::GoAfterPanic => "go_after_panic",
            Self::GoAfterSignal => "go_after_signal",
            Self::GoGoroutine => "go_goroutine",
            Self::GoFrame1 => "go_frame_1",
            Self::GoFrame2 => "go_frame_2",
            Self::RubyBeforeRailsTrace => "ruby_before_rails_trace",
            Self::Ruby => "ruby",
            Self::DartExc => "dart_exc",
            Self::DartStack => "dart_stack",
            Self::DartTypeErr1 => "dart_type_err_1",
            Self::DartTypeErr2 => "dart_type_err_2",
            Self::DartTypeErr3 => "dart_type_err_3",
            Self::DartTypeErr4 => "dart_type_err_4",
            Self::DartFormatErr1 => "dart_format_err_1",
            Self::DartFormatErr2 => "dart_format_err_2",
            Self::DartFormatErr3 => "dart_format_err_3",
            Self::DartMethodErr1 => "dart_method_err_1",
            Self::DartMethodErr2 => "dart_method_err_2",
            Self::DartMethodErr3 => "dart_method_err_3",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 규칙 문법 단위의 언어
///
/// `All`은 모든 문법을 선언 순서대로 합친 가상 언어입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Java, JavaScript(V8), C#
    Java,
    Python,
    Php,
    Go,
    Ruby,
    Dart,
    /// 모든 문법
    All,
}

/// 설정에서 허용되는 언어 이름 (대소문자 무시)
const LANGUAGE_NAMES: &[&str] = &[
    "java",
    "javascript",
    "js",
    "csharp",
    "py",
    "python",
    "php",
    "go",
    "rb",
    "ruby",
    "dart",
    "all",
];

impl Language {
    /// `All`이 확장되는 문법 목록 (선언 순서가 매칭 우선순위)
    pub const GRAMMARS: [Language; 6] = [
        Language::Java,
        Language::Python,
        Language::Php,
        Language::Go,
        Language::Ruby,
        Language::Dart,
    ];

    /// 이 언어가 포함하는 문법 목록을 반환합니다.
    pub fn grammars(self) -> &'static [Language] {
        match self {
            Self::All => &Self::GRAMMARS,
            Self::Java => &[Language::Java],
            Self::Python => &[Language::Python],
            Self::Php => &[Language::Php],
            Self::Go => &[Language::Go],
            Self::Ruby => &[Language::Ruby],
            Self::Dart => &[Language::Dart],
        }
    }

    /// 대표 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Python => "python",
            Self::Php => "php",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Dart => "dart",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" | "javascript" | "js" | "csharp" => Ok(Self::Java),
            "py" | "python" => Ok(Self::Python),
            "php" => Ok(Self::Php),
            "go" => Ok(Self::Go),
            "rb" | "ruby" => Ok(Self::Ruby),
            "dart" => Ok(Self::Dart),
            "all" => Ok(Self::All),
            _ => Err(DetectorError::UnknownLanguage(s.to_owned())),
        }
    }
}

/// 허용되는 모든 언어 이름을 반환합니다.
pub fn supported_languages() -> &'static [&'static str] {
    LANGUAGE_NAMES
}

/// 정적 규칙 정의
///
/// `from` 상태 중 하나에서 `pattern`이 줄에 매칭되면 `to` 상태로 전이합니다.
#[derive(Debug, Clone, Copy)]
pub struct RuleDef {
    pub from: &'static [State],
    pub pattern: &'static str,
    pub to: State,
}

/// 컴파일된 규칙
#[derive(Debug)]
pub struct Rule {
    from: &'static [State],
    pattern: &'static str,
    regex: Regex,
    to: State,
}

impl Rule {
    /// 정의를 컴파일합니다.
    ///
    /// 패턴은 멀티라인 모드(`^`/`$`가 줄 경계)로 컴파일됩니다.
    pub fn compile(def: &RuleDef) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(def.pattern).multi_line(true).build()?;
        Ok(Self {
            from: def.from,
            pattern: def.pattern,
            regex,
            to: def.to,
        })
    }

    /// 줄의 어느 위치에서든 패턴이 매칭되는지 확인합니다.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// 전이 출발 상태 목록
    pub fn from_states(&self) -> &'static [State] {
        self.from
    }

    /// 원본 패턴 문자열
    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    /// 전이 대상 상태
    pub fn target(&self) -> State {
        self.to
    }

    /// 같은 전이인지 확인합니다 (패턴과 대상 상태 기준).
    pub fn same_transition(&self, other: &Rule) -> bool {
        self.pattern == other.pattern && self.to == other.to
    }
}
