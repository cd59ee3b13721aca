#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 규칙 모델, 패턴 매칭, 정책 테이블, 규칙 파일 로더
//! - [`detector`]: 출발지별 슬라이딩 윈도우 의심 트래픽 탐지
//! - [`alert`]: 탐지 결과 -> 알림 변환, 쿨다운 중복 제거
//! - [`engine`]: 패킷 하나의 평가 흐름 (검증 -> 매칭 -> 탐지 -> 로그 -> 알림)
//! - [`pipeline`]: 패킷 스트림 평가 (Pipeline trait 구현)
//! - [`sink`]: 채널/메모리 협력자 구현
//! - [`config`]: 엔진 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod alert;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod rule;
pub mod sink;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{EngineStats, Evaluation, FirewallEngine, Rejection, SweepReport};

// 파이프라인
pub use pipeline::{PacketEnvelope, PacketOutcome, PacketPipeline, PacketPipelineBuilder};

// 설정
pub use config::{EngineConfig, EngineConfigBuilder};

// 에러
pub use error::EngineError;

// 규칙
pub use rule::{
    CompiledRule, FirewallRule, PolicySnapshot, PolicyStats, PolicyTable, RuleLoader,
    RuleUpdateReport,
};

// 탐지/알림
pub use alert::AlertClassifier;
pub use detector::{Finding, HeuristicHit, HeuristicKind, SuspicionDetector};

// 협력자
pub use sink::{ChannelAlertSink, ChannelLogSink, LogSinkMessage, MemorySink};
