use super::health_checker::HealthCheckScheduler;
use super::manager::LoadBalancer;
use anyhow::Result;
use fennel_core::client::AdapterFactory;
use fennel_core::config::model::Config;
use fennel_core::store::ChannelStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 负载均衡服务
/// 整合负载均衡器和健康检查调度器，提供统一的服务接口
pub struct LoadBalanceService {
    balancer: Arc<LoadBalancer>,
    scheduler: Arc<HealthCheckScheduler>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalanceService {
    /// 创建服务：校验配置，加载快照，并把配置中的渠道注册到存储
    pub async fn new(
        config: &Config,
        store: Arc<dyn ChannelStore>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let balancer = Arc::new(
            LoadBalancer::new(
                store,
                config.model_mapping.clone(),
                config.settings.balance.clone(),
            )
            .await?,
        );

        let mut channel_ids: Vec<&String> = config.channels.keys().collect();
        channel_ids.sort();
        for channel_id in channel_ids {
            let channel_config = &config.channels[channel_id];
            let channel = balancer
                .register_channel(channel_config.to_new_channel())
                .await?;
            info!(
                "Registered channel '{}' as #{} ({}, {} models)",
                channel_id,
                channel.id,
                channel.channel_type,
                channel_config.models.len()
            );
        }

        let scheduler = Arc::new(HealthCheckScheduler::new(
            balancer.clone(),
            adapters,
            config.settings.health_check.clone(),
        ));

        Ok(Self {
            balancer,
            scheduler,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn balancer(&self) -> Arc<LoadBalancer> {
        self.balancer.clone()
    }

    pub fn scheduler(&self) -> Arc<HealthCheckScheduler> {
        self.scheduler.clone()
    }

    /// 启动后台调度：刷新与恢复总是运行，探测受 health_check.enabled 控制
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let scheduler = self.scheduler.clone();
        let cancel = self.cancel.child_token();
        *task = Some(tokio::spawn(scheduler.run(cancel)));
        info!("Load balance service started");
    }

    /// 停止后台任务并等待其退出
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Health check scheduler task ended abnormally: {}", e);
            }
        }
        info!("Load balance service stopped");
    }
}
