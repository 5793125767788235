use super::manager::{ChannelModelConf, LoadBalancer};
use fennel_core::client::{AdapterFactory, ClientError, RelayOperation, RequestBody};
use fennel_core::config::model::HealthCheckSettings;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    RunningSweep,
    Sleeping,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::RunningSweep => "running-sweep",
            SchedulerState::Sleeping => "sleeping",
        }
    }
}

/// 一轮检查的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub recovered: u64,
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// 健康检查调度器
///
/// 每轮先刷新渠道快照并执行恢复，再逐个探测关注列表中的渠道模型，然后休眠到下一轮。
/// 关注列表为空或探测被关闭时保持空闲，但每个 idle 间隔仍会刷新快照并执行恢复。
pub struct HealthCheckScheduler {
    balancer: Arc<LoadBalancer>,
    adapters: Arc<dyn AdapterFactory>,
    settings: HealthCheckSettings,
    watch_models: RwLock<Vec<String>>,
    state: RwLock<SchedulerState>,
}

impl HealthCheckScheduler {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        adapters: Arc<dyn AdapterFactory>,
        settings: HealthCheckSettings,
    ) -> Self {
        let watch_models = settings.watch_models.clone();
        Self {
            balancer,
            adapters,
            settings,
            watch_models: RwLock::new(watch_models),
            state: RwLock::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.write() = state;
    }

    pub fn watch_models(&self) -> Vec<String> {
        self.watch_models.read().clone()
    }

    /// 运行时替换关注列表，下一轮生效
    pub fn set_watch_models(&self, models: Vec<String>) {
        info!("Health check watch list updated: {:?}", models);
        *self.watch_models.write() = models;
    }

    /// 探测请求：单条用户消息，max_tokens = 1，非流式
    fn probe_request(&self, model_key: &str) -> RelayOperation {
        RelayOperation::ChatCompletion(RequestBody::Json(json!({
            "model": model_key,
            "messages": [{"role": "user", "content": self.settings.probe_prompt}],
            "max_tokens": 1,
            "stream": false,
        })))
    }

    async fn probe(&self, target: &ChannelModelConf) -> Result<(), ProbeError> {
        let adapter = self.adapters.create(&target.channel)?;
        let timeout = self.settings.probe_timeout();
        match tokio::time::timeout(timeout, adapter.dispatch(self.probe_request(&target.model_key)))
            .await
        {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    async fn record_probe(&self, target: &ChannelModelConf, report: &mut CycleReport) {
        report.probed += 1;
        match self.probe(target).await {
            Ok(()) => {
                report.succeeded += 1;
                debug!(
                    "Probe succeeded for channel {} model {}",
                    target.channel.id, target.model_key
                );
                if let Err(e) = self.balancer.success_cb(target.model_record_id).await {
                    warn!("Failed to record probe success for {}: {}", target.model_record_id, e);
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    "Probe failed for channel {} model {}: {}",
                    target.channel.id, target.model_key, e
                );
                if let Err(e) = self.balancer.fail_cb(target.model_record_id).await {
                    warn!("Failed to record probe failure for {}: {}", target.model_record_id, e);
                }
            }
        }
    }

    /// 刷新渠道快照并执行恢复，返回恢复的行数；出错只记录日志
    pub async fn maintain(&self) -> u64 {
        if let Err(e) = self.balancer.refresh_channels().await {
            error!("Channel snapshot refresh failed: {}", e);
        }

        match self.balancer.recover_channel_models().await {
            Ok(recovered) => recovered,
            Err(e) => {
                error!("Recovery sweep failed: {}", e);
                0
            }
        }
    }

    fn probing_enabled(&self) -> bool {
        self.settings.enabled && !self.watch_models.read().is_empty()
    }

    /// 执行一轮：刷新与恢复 + 逐个探测
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport {
            recovered: self.maintain().await,
            ..CycleReport::default()
        };

        for model_id in self.watch_models() {
            let targets = match self.balancer.probe_targets(&model_id).await {
                Ok(targets) => targets,
                Err(e) => {
                    error!("Failed to load probe targets for '{}': {}", model_id, e);
                    continue;
                }
            };
            debug!("Probing {} targets for '{}'", targets.len(), model_id);

            for target in &targets {
                let delay = self.settings.probe_delay();
                let cancelled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = async {
                        tokio::time::sleep(delay).await;
                        self.record_probe(target, &mut report).await;
                    } => false,
                };
                if cancelled {
                    report.cancelled = true;
                    return report;
                }
            }
        }

        report
    }

    /// 调度主循环，取消令牌触发后尽快退出
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Health check scheduler started");

        while !cancel.is_cancelled() {
            self.set_state(SchedulerState::Idle);

            let interval = if self.probing_enabled() {
                self.set_state(SchedulerState::RunningSweep);
                let report = self.run_cycle(&cancel).await;
                info!(
                    "Health check cycle finished: recovered={}, probed={}, succeeded={}, failed={}",
                    report.recovered, report.probed, report.succeeded, report.failed
                );
                self.set_state(SchedulerState::Sleeping);
                self.settings.cycle_interval()
            } else {
                let recovered = self.maintain().await;
                debug!("No models to probe, staying idle (recovered={})", recovered);
                self.settings.idle_interval()
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.set_state(SchedulerState::Idle);
        info!("Health check scheduler stopped");
    }
}
