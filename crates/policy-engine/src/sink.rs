//! 협력자 sink 구현 -- 로그/알림 레코드를 엔진 밖으로 전달합니다.
//!
//! - [`ChannelLogSink`], [`ChannelAlertSink`]: `mpsc` 채널로 전달 (fire-and-forget).
//!   채널이 가득 차거나 닫혀 있으면 대기하지 않고 즉시 [`PersistenceError`]를 반환합니다.
//! - [`MemorySink`]: 레코드를 메모리에 보관합니다. CLI와 테스트에서 사용하며,
//!   실패를 시뮬레이션할 수 있습니다.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use firewallx_core::error::PersistenceError;
use firewallx_core::pipeline::{AlertSink, LogSink};
use firewallx_core::types::{Alert, LogRecord, RejectedPacket, TenantContext};

/// 로그 채널로 전달되는 메시지
#[derive(Debug, Clone)]
pub enum LogSinkMessage {
    /// 평가된 패킷의 로그 레코드
    Record(LogRecord),
    /// 거부된 패킷 레코드
    Rejected(RejectedPacket),
}

fn send_failure<T>(err: &TrySendError<T>) -> String {
    match err {
        TrySendError::Full(_) => "channel full".to_owned(),
        TrySendError::Closed(_) => "channel closed".to_owned(),
    }
}

// ─── Channel sinks ───────────────────────────────────────────────────

/// `mpsc` 채널 기반 로그 sink
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: mpsc::Sender<LogSinkMessage>,
}

impl ChannelLogSink {
    /// 지정한 용량의 채널을 만들고 sink와 수신측을 반환합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LogSinkMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 기존 송신측으로 sink를 만듭니다.
    pub fn from_sender(tx: mpsc::Sender<LogSinkMessage>) -> Self {
        Self { tx }
    }
}

impl LogSink for ChannelLogSink {
    async fn persist_log(&self, record: &LogRecord) -> Result<(), PersistenceError> {
        self.tx
            .try_send(LogSinkMessage::Record(record.clone()))
            .map_err(|e| PersistenceError::Log {
                reason: send_failure(&e),
            })
    }

    async fn persist_rejection(&self, record: &RejectedPacket) -> Result<(), PersistenceError> {
        self.tx
            .try_send(LogSinkMessage::Rejected(record.clone()))
            .map_err(|e| PersistenceError::Log {
                reason: send_failure(&e),
            })
    }
}

/// `mpsc` 채널 기반 알림 sink
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<Alert>,
}

impl ChannelAlertSink {
    /// 지정한 용량의 채널을 만들고 sink와 수신측을 반환합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 기존 송신측으로 sink를 만듭니다.
    pub fn from_sender(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx }
    }
}

impl AlertSink for ChannelAlertSink {
    async fn persist_alert(&self, alert: &Alert) -> Result<(), PersistenceError> {
        self.tx
            .try_send(alert.clone())
            .map_err(|e| PersistenceError::Alert {
                reason: send_failure(&e),
            })
    }
}

// ─── MemorySink ──────────────────────────────────────────────────────

/// 메모리 sink
///
/// 로그와 알림 협력자를 모두 구현합니다. 복제본은 같은 저장소를 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    logs: Arc<Mutex<Vec<LogRecord>>>,
    rejections: Arc<Mutex<Vec<RejectedPacket>>>,
    alerts: Arc<Mutex<Vec<Alert>>>,
    fail_logs: bool,
    fail_alerts: bool,
}

impl MemorySink {
    /// 빈 메모리 sink를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 로그 저장이 항상 실패하도록 설정합니다.
    pub fn with_failing_logs(mut self) -> Self {
        self.fail_logs = true;
        self
    }

    /// 알림 저장이 항상 실패하도록 설정합니다.
    pub fn with_failing_alerts(mut self) -> Self {
        self.fail_alerts = true;
        self
    }

    /// 저장된 로그 레코드
    pub async fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().await.clone()
    }

    /// 테넌트의 로그 중 검색어와 일치하는 레코드를 최신순으로 반환합니다.
    ///
    /// 검색어는 출발지/목적지 주소와 프로토콜에 대해 부분 일치로 비교합니다.
    /// `limit`이 `None`이면 일치하는 모든 레코드를 반환합니다.
    pub async fn logs_matching(
        &self,
        tenant: &TenantContext,
        term: &str,
        limit: Option<usize>,
    ) -> Vec<LogRecord> {
        self.logs
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant.tenant_id() && r.matches_search(term))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// 저장된 거부 레코드
    pub async fn rejections(&self) -> Vec<RejectedPacket> {
        self.rejections.lock().await.clone()
    }

    /// 저장된 알림
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

impl LogSink for MemorySink {
    async fn persist_log(&self, record: &LogRecord) -> Result<(), PersistenceError> {
        if self.fail_logs {
            return Err(PersistenceError::Log {
                reason: "log store unavailable".to_owned(),
            });
        }
        self.logs.lock().await.push(record.clone());
        Ok(())
    }

    async fn persist_rejection(&self, record: &RejectedPacket) -> Result<(), PersistenceError> {
        if self.fail_logs {
            return Err(PersistenceError::Log {
                reason: "log store unavailable".to_owned(),
            });
        }
        self.rejections.lock().await.push(record.clone());
        Ok(())
    }
}

impl AlertSink for MemorySink {
    async fn persist_alert(&self, alert: &Alert) -> Result<(), PersistenceError> {
        if self.fail_alerts {
            return Err(PersistenceError::Alert {
                reason: "alert store unavailable".to_owned(),
            });
        }
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}
