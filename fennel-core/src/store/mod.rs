//! 渠道与渠道模型的持久化接口

pub mod memory;

use crate::channel::{
    Channel, ChannelModel, ChannelStatus, LimitState, NewChannel, RecoveryReset, ScoreLimits,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryChannelStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("channel {0} not found")]
    ChannelNotFound(i64),
    #[error("channel model {0} not found")]
    ModelNotFound(i64),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// 渠道存储
///
/// 评分更新必须是单次原子操作，并发的增量可以任意交换顺序。
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError>;

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>, StoreError>;

    /// 软硬限制均可用的模型行
    async fn find_usable_models(&self, model_keys: &[String])
        -> Result<Vec<ChannelModel>, StoreError>;

    /// 硬限制可用的模型行（包括已挂起的），用于主动探测
    async fn find_probe_models(&self, model_keys: &[String])
        -> Result<Vec<ChannelModel>, StoreError>;

    async fn apply_success(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError>;

    async fn apply_failure(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError>;

    /// 恢复挂起时间超过截止点的模型，返回受影响的行数
    async fn recover_suspended(
        &self,
        cutoff: DateTime<Utc>,
        reset: &RecoveryReset,
    ) -> Result<u64, StoreError>;

    /// 按内容哈希幂等注册渠道，并补齐缺失的模型行
    async fn create_channel(
        &self,
        channel: NewChannel,
        initial_weight: i32,
    ) -> Result<Channel, StoreError>;

    /// 删除渠道及其全部模型行，返回是否存在
    async fn delete_channel(&self, id: i64) -> Result<bool, StoreError>;

    async fn set_channel_status(&self, id: i64, status: ChannelStatus) -> Result<(), StoreError>;

    async fn set_hard_limit(&self, model_id: i64, state: LimitState) -> Result<(), StoreError>;

    async fn get_channel_model(&self, model_id: i64) -> Result<Option<ChannelModel>, StoreError>;

    async fn list_channel_models(&self, channel_id: i64)
        -> Result<Vec<ChannelModel>, StoreError>;
}
