//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않은 경우 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tracefold_`
//! - 모듈명: `detector_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(tracefold_core::metrics::DETECTOR_LINES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 분류 결과 레이블 키 (no_trace, start_trace, inside_trace, end_trace)
pub const LABEL_CLASSIFICATION: &str = "classification";

/// 강제 플러시 사유 레이블 키 (max_lines, max_bytes, timeout, shutdown)
pub const LABEL_REASON: &str = "reason";

/// 입력 형식 레이블 키 (text, json)
pub const LABEL_FORMAT: &str = "format";

// ─── Detector 메트릭 ────────────────────────────────────────────────

/// Detector: 분류된 전체 줄 수 (counter, label: classification)
pub const DETECTOR_LINES_TOTAL: &str = "tracefold_detector_lines_total";

/// Detector: 메시지를 추출하지 못해 그대로 통과한 레코드 수 (counter)
pub const DETECTOR_MISSING_MESSAGE_TOTAL: &str = "tracefold_detector_missing_message_total";

/// Detector: 내보낸 레코드 수 (counter)
pub const DETECTOR_RECORDS_EMITTED_TOTAL: &str = "tracefold_detector_records_emitted_total";

/// Detector: 여러 줄을 합쳐 내보낸 트레이스 수 (counter)
pub const DETECTOR_TRACES_COMBINED_TOTAL: &str = "tracefold_detector_traces_combined_total";

/// Detector: 강제 플러시 수 (counter, label: reason)
pub const DETECTOR_FORCED_FLUSHES_TOTAL: &str = "tracefold_detector_forced_flushes_total";

/// Detector: 현재 관리 중인 스트림 수 (gauge)
pub const DETECTOR_ACTIVE_STREAMS: &str = "tracefold_detector_active_streams";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 읽은 입력 줄 수 (counter, label: format)
pub const DAEMON_INPUT_LINES_TOTAL: &str = "tracefold_daemon_input_lines_total";

/// Daemon: JSON 디코딩에 실패해 평문으로 처리한 줄 수 (counter)
pub const DAEMON_INPUT_DECODE_ERRORS_TOTAL: &str = "tracefold_daemon_input_decode_errors_total";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "tracefold_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `tracefold-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Detector
    describe_counter!(
        DETECTOR_LINES_TOTAL,
        "Total number of lines classified by the trace detector"
    );
    describe_counter!(
        DETECTOR_MISSING_MESSAGE_TOTAL,
        "Total number of records passed through without an extractable message"
    );
    describe_counter!(
        DETECTOR_RECORDS_EMITTED_TOTAL,
        "Total number of records emitted downstream"
    );
    describe_counter!(
        DETECTOR_TRACES_COMBINED_TOTAL,
        "Total number of multi-line traces emitted as a single combined record"
    );
    describe_counter!(
        DETECTOR_FORCED_FLUSHES_TOTAL,
        "Total number of forced flushes (max_lines, max_bytes, timeout, shutdown)"
    );
    describe_gauge!(
        DETECTOR_ACTIVE_STREAMS,
        "Current number of streams with an accumulator"
    );

    // Daemon
    describe_counter!(
        DAEMON_INPUT_LINES_TOTAL,
        "Total number of input lines read by the daemon"
    );
    describe_counter!(
        DAEMON_INPUT_DECODE_ERRORS_TOTAL,
        "Total number of JSON input lines that failed to decode and were treated as text"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, labels: version)"
    );
}
