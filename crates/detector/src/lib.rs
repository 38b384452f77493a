#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 언어별 상태 전이 규칙 카탈로그와 병합된 규칙 집합
//! - [`detector`]: 줄 단위 트레이스 분류 상태 기계
//! - [`accumulator`]: 스트림 하나의 버퍼링 및 트레이스 합치기
//! - [`manager`]: 스트림별 누적기 관리, 타임아웃 스윕 (Pipeline trait 구현)
//! - [`config`]: 누적기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod accumulator;
pub mod config;
pub mod detector;
pub mod error;
pub mod manager;
pub mod rule;

// --- 주요 타입 re-export ---

// 매니저
pub use manager::{AccumulatorManager, AccumulatorManagerBuilder, StreamKey};

// 누적기
pub use accumulator::{
    BufferOptions, DEFAULT_MESSAGE_FIELDS, FlushReason, MessageField, TraceAccumulator, TraceSink,
};

// 탐지기
pub use detector::{Classification, TraceDetector};

// 규칙
pub use rule::{Language, RuleSet, State, supported_languages};

// 설정
pub use config::{AccumulatorConfig, AccumulatorConfigBuilder};

// 에러
pub use error::DetectorError;
