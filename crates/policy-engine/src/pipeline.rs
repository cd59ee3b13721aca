//! 패킷 파이프라인 -- 패킷 스트림을 엔진으로 평가하는 장기 실행 컴포넌트
//!
//! [`PacketPipeline`]은 core의 [`Pipeline`](firewallx_core::pipeline::Pipeline) trait을 구현합니다.
//!
//! # 내부 아키텍처
//! ```text
//! Ingestion -> mpsc<PacketEnvelope> -> worker (max_in_flight 동시 평가) -> FirewallEngine
//!                                         |                                  |
//!                                         +-- 주기적 sweep                    +-> mpsc<PacketOutcome> (선택)
//! ```
//!
//! `stop()`은 새 패킷 수신을 중단하고, 이미 채널에 들어온 패킷과 평가 중인 패킷이
//! 모두 끝날 때까지 기다립니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use firewallx_core::error::{FirewallxError, PipelineError};
use firewallx_core::pipeline::{AlertSink, HealthStatus, LogSink, Pipeline};
use firewallx_core::types::{PacketDescriptor, TenantContext};

use crate::engine::{Evaluation, FirewallEngine, Rejection};
use crate::error::EngineError;

/// 파이프라인 입력 -- 테넌트와 패킷 디스크립터
#[derive(Debug, Clone)]
pub struct PacketEnvelope {
    /// 소유 테넌트
    pub tenant: TenantContext,
    /// 패킷 디스크립터
    pub descriptor: PacketDescriptor,
}

impl PacketEnvelope {
    /// 새 입력을 생성합니다.
    pub fn new(tenant: TenantContext, descriptor: PacketDescriptor) -> Self {
        Self { tenant, descriptor }
    }
}

/// 파이프라인 출력 -- 패킷 하나의 평가 결과
#[derive(Debug)]
pub struct PacketOutcome {
    /// 소유 테넌트
    pub tenant: TenantContext,
    /// 평가 결과
    pub result: Result<Evaluation, Rejection>,
}

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 패킷 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use firewallx_engine::{PacketPipelineBuilder, PacketEnvelope};
///
/// let (mut pipeline, outcome_rx) = PacketPipelineBuilder::new(engine).build()?;
/// let packet_tx = pipeline.packet_sender().expect("internal channel");
///
/// pipeline.start().await?;
/// packet_tx.send(PacketEnvelope::new(tenant, descriptor)).await?;
/// pipeline.stop().await?;
/// ```
pub struct PacketPipeline<L: LogSink, A: AlertSink> {
    engine: Arc<FirewallEngine<L, A>>,
    state: PipelineState,
    packet_rx: Option<mpsc::Receiver<PacketEnvelope>>,
    packet_tx: Option<mpsc::Sender<PacketEnvelope>>,
    outcome_tx: Option<mpsc::Sender<PacketOutcome>>,
    slots: Arc<Semaphore>,
    max_in_flight: usize,
    sweep_interval: Duration,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
}

impl<L: LogSink, A: AlertSink> PacketPipeline<L, A> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 평가를 마친 패킷 수 (거부 포함)
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// 내부 입력 채널의 송신측을 반환합니다.
    ///
    /// 외부 수신 채널을 설정한 경우 `None`입니다.
    pub fn packet_sender(&self) -> Option<mpsc::Sender<PacketEnvelope>> {
        self.packet_tx.clone()
    }

    /// 공유 엔진
    pub fn engine(&self) -> &Arc<FirewallEngine<L, A>> {
        &self.engine
    }
}

impl<L: LogSink, A: AlertSink> Pipeline for PacketPipeline<L, A> {
    async fn start(&mut self) -> Result<(), FirewallxError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let packet_rx = self.packet_rx.take().ok_or_else(|| {
            PipelineError::InitFailed("packet receiver already consumed".to_owned())
        })?;

        tracing::info!(
            max_in_flight = self.max_in_flight,
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "starting packet pipeline"
        );

        let worker = Worker {
            engine: Arc::clone(&self.engine),
            outcome_tx: self.outcome_tx.clone(),
            slots: Arc::clone(&self.slots),
            sweep_interval: self.sweep_interval,
            cancel: self.cancel.clone(),
            processed: Arc::clone(&self.processed),
        };
        self.worker = Some(tokio::spawn(worker.run(packet_rx)));

        self.state = PipelineState::Running;
        tracing::info!("packet pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FirewallxError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping packet pipeline");
        self.cancel.cancel();
        self.packet_tx = None;

        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "packet pipeline worker failed");
        }

        self.state = PipelineState::Stopped;
        tracing::info!(processed = self.processed_count(), "packet pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.worker.as_ref().is_none_or(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("worker exited".to_owned());
                }
                if self.slots.available_permits() == 0 {
                    HealthStatus::Degraded(format!(
                        "all {} evaluation slots busy",
                        self.max_in_flight
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

// ─── Worker ──────────────────────────────────────────────────────────

struct Worker<L: LogSink, A: AlertSink> {
    engine: Arc<FirewallEngine<L, A>>,
    outcome_tx: Option<mpsc::Sender<PacketOutcome>>,
    slots: Arc<Semaphore>,
    sweep_interval: Duration,
    cancel: CancellationToken,
    processed: Arc<AtomicU64>,
}

impl<L: LogSink, A: AlertSink> Worker<L, A> {
    async fn run(self, mut packet_rx: mpsc::Receiver<PacketEnvelope>) {
        let mut tasks = JoinSet::new();
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 첫 tick은 즉시 완료됨
        sweep.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("packet pipeline received shutdown signal");
                    break;
                }
                _ = sweep.tick() => {
                    let report = self.engine.sweep(Utc::now());
                    tracing::debug!(
                        sources_removed = report.sources_removed,
                        alerts_removed = report.alerts_removed,
                        "periodic sweep"
                    );
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "evaluation task failed");
                    }
                }
                received = packet_rx.recv() => {
                    let Some(envelope) = received else {
                        tracing::info!("packet channel closed, stopping packet pipeline worker");
                        break;
                    };
                    if !self.dispatch(&mut tasks, envelope).await {
                        break;
                    }
                }
            }
        }

        // 새 패킷은 거부하고, 이미 채널에 들어온 패킷은 평가
        packet_rx.close();
        let mut drained = 0usize;
        while let Some(envelope) = packet_rx.recv().await {
            if !self.dispatch(&mut tasks, envelope).await {
                break;
            }
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(count = drained, "draining queued packets");
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "evaluation task failed");
            }
        }
    }

    /// 평가 슬롯을 얻은 뒤 패킷 평가 태스크를 생성합니다.
    async fn dispatch(&self, tasks: &mut JoinSet<()>, envelope: PacketEnvelope) -> bool {
        let Ok(permit) = Arc::clone(&self.slots).acquire_owned().await else {
            tracing::error!("evaluation slots closed");
            return false;
        };

        let engine = Arc::clone(&self.engine);
        let outcome_tx = self.outcome_tx.clone();
        let processed = Arc::clone(&self.processed);

        tasks.spawn(async move {
            let PacketEnvelope { tenant, descriptor } = envelope;
            let result = engine.evaluate(&tenant, descriptor).await;
            processed.fetch_add(1, Ordering::Relaxed);

            if let Some(tx) = outcome_tx
                && tx.send(PacketOutcome { tenant, result }).await.is_err()
            {
                tracing::debug!("outcome receiver dropped");
            }
            drop(permit);
        });
        true
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// 패킷 파이프라인 빌더
///
/// 파이프라인을 구성하고 필요한 채널을 생성합니다.
pub struct PacketPipelineBuilder<L: LogSink, A: AlertSink> {
    engine: Arc<FirewallEngine<L, A>>,
    packet_rx: Option<mpsc::Receiver<PacketEnvelope>>,
    outcome_tx: Option<mpsc::Sender<PacketOutcome>>,
    collect_outcomes: bool,
}

impl<L: LogSink, A: AlertSink> PacketPipelineBuilder<L, A> {
    /// 공유 엔진으로 새 빌더를 생성합니다.
    pub fn new(engine: Arc<FirewallEngine<L, A>>) -> Self {
        Self {
            engine,
            packet_rx: None,
            outcome_tx: None,
            collect_outcomes: true,
        }
    }

    /// 외부 입력 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다
    /// ([`PacketPipeline::packet_sender`]로 송신측을 얻습니다).
    pub fn packet_receiver(mut self, rx: mpsc::Receiver<PacketEnvelope>) -> Self {
        self.packet_rx = Some(rx);
        self
    }

    /// 외부 결과 전송 채널을 설정합니다.
    pub fn outcome_sender(mut self, tx: mpsc::Sender<PacketOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    /// 평가 결과를 채널로 내보내지 않습니다.
    ///
    /// 결과는 협력자 sink로만 전달됩니다.
    pub fn discard_outcomes(mut self) -> Self {
        self.collect_outcomes = false;
        self.outcome_tx = None;
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Returns
    /// - `PacketPipeline`: 파이프라인 인스턴스
    /// - `Option<mpsc::Receiver<PacketOutcome>>`: 결과 수신 채널
    ///   (외부 outcome_sender를 설정했거나 결과를 버리는 경우 None)
    pub fn build(
        self,
    ) -> Result<(PacketPipeline<L, A>, Option<mpsc::Receiver<PacketOutcome>>), EngineError> {
        let config = self.engine.config();
        config.validate()?;
        let capacity = config.channel_capacity;
        let max_in_flight = config.max_in_flight;
        let sweep_interval = config.sweep_interval();

        let (packet_tx, packet_rx) = match self.packet_rx {
            Some(rx) => (None, rx),
            None => {
                let (tx, rx) = mpsc::channel(capacity);
                (Some(tx), rx)
            }
        };

        let (outcome_tx, outcome_rx) = match (self.outcome_tx, self.collect_outcomes) {
            (Some(tx), _) => (Some(tx), None),
            (None, true) => {
                let (tx, rx) = mpsc::channel(capacity);
                (Some(tx), Some(rx))
            }
            (None, false) => (None, None),
        };

        let pipeline = PacketPipeline {
            engine: self.engine,
            state: PipelineState::Initialized,
            packet_rx: Some(packet_rx),
            packet_tx,
            outcome_tx,
            slots: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            sweep_interval,
            cancel: CancellationToken::new(),
            worker: None,
            processed: Arc::new(AtomicU64::new(0)),
        };

        Ok((pipeline, outcome_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::rule::FirewallRule;
    use crate::sink::MemorySink;
    use firewallx_core::types::{Action, Protocol};

    fn engine(sink: &MemorySink) -> Arc<FirewallEngine<MemorySink, MemorySink>> {
        let engine =
            FirewallEngine::new(EngineConfig::default(), sink.clone(), sink.clone()).unwrap();
        Arc::new(engine)
    }

    fn envelope(port: u16) -> PacketEnvelope {
        PacketEnvelope::new(
            TenantContext::new("tenant-a"),
            PacketDescriptor::new(
                Utc::now(),
                "192.168.0.10".parse().unwrap(),
                "10.0.0.1".parse().unwrap(),
                port,
                Protocol::Tcp,
                100,
            ),
        )
    }

    #[test]
    fn builder_creates_pipeline() {
        let sink = MemorySink::new();
        let (pipeline, outcome_rx) = PacketPipelineBuilder::new(engine(&sink)).build().unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert!(pipeline.packet_sender().is_some());
        assert!(outcome_rx.is_some());
    }

    #[test]
    fn builder_with_external_channels() {
        let sink = MemorySink::new();
        let (_packet_tx, packet_rx) = mpsc::channel(4);
        let (outcome_tx, _outcome_rx) = mpsc::channel(4);
        let (pipeline, rx) = PacketPipelineBuilder::new(engine(&sink))
            .packet_receiver(packet_rx)
            .outcome_sender(outcome_tx)
            .build()
            .unwrap();
        assert!(pipeline.packet_sender().is_none());
        assert!(rx.is_none());
    }

    #[test]
    fn builder_can_discard_outcomes() {
        let sink = MemorySink::new();
        let (_, rx) = PacketPipelineBuilder::new(engine(&sink))
            .discard_outcomes()
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn pipeline_lifecycle() {
        let sink = MemorySink::new();
        let (mut pipeline, _rx) = PacketPipelineBuilder::new(engine(&sink)).build().unwrap();

        assert!(!pipeline.health_check().await.is_healthy());
        assert!(pipeline.stop().await.is_err());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state_name(), "running");
        assert!(pipeline.health_check().await.is_healthy());
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.stop().await.is_err());
        // 수신 채널은 한 번만 사용할 수 있음
        assert!(pipeline.start().await.is_err());
    }

    #[tokio::test]
    async fn packets_are_evaluated_and_reported() {
        let sink = MemorySink::new();
        let engine = engine(&sink);
        engine.update_rules(
            &TenantContext::new("tenant-a"),
            vec![FirewallRule::new("deny-ssh", Action::Block).with_port("22")],
        );

        let (mut pipeline, outcome_rx) = PacketPipelineBuilder::new(engine).build().unwrap();
        let mut outcome_rx = outcome_rx.unwrap();
        let tx = pipeline.packet_sender().unwrap();
        pipeline.start().await.unwrap();

        tx.send(envelope(22)).await.unwrap();
        tx.send(envelope(80)).await.unwrap();

        let mut actions = Vec::new();
        for _ in 0..2 {
            let outcome = outcome_rx.recv().await.unwrap();
            actions.push(outcome.result.unwrap().decision.action);
        }
        actions.sort_by_key(|a| a.as_str());
        assert_eq!(actions, vec![Action::Allow, Action::Block]);

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.processed_count(), 2);
        assert_eq!(sink.logs().await.len(), 2);
    }

    #[tokio::test]
    async fn stop_drains_queued_packets() {
        let sink = MemorySink::new();
        let (mut pipeline, _) = PacketPipelineBuilder::new(engine(&sink))
            .discard_outcomes()
            .build()
            .unwrap();
        let tx = pipeline.packet_sender().unwrap();

        for port in 0..50 {
            tx.send(envelope(port)).await.unwrap();
        }
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();

        assert_eq!(pipeline.processed_count(), 50);
        assert_eq!(sink.logs().await.len(), 50);
        // 정지 후에는 새 패킷을 받지 않음
        assert!(tx.send(envelope(1)).await.is_err());
    }
}
