use super::{ChannelStore, StoreError};
use crate::channel::{
    Channel, ChannelModel, ChannelStatus, LimitState, NewChannel, RecoveryReset, ScoreLimits,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct MemoryState {
    next_channel_id: i64,
    next_model_id: i64,
    channels: BTreeMap<i64, Channel>,
    models: BTreeMap<i64, ChannelModel>,
}

impl MemoryState {
    fn model_mut(&mut self, model_id: i64) -> Result<&mut ChannelModel, StoreError> {
        self.models
            .get_mut(&model_id)
            .ok_or(StoreError::ModelNotFound(model_id))
    }

    fn collect_models<F>(&self, model_keys: &[String], filter: F) -> Vec<ChannelModel>
    where
        F: Fn(&ChannelModel) -> bool,
    {
        self.models
            .values()
            .filter(|m| model_keys.contains(&m.model_key) && filter(m))
            .cloned()
            .collect()
    }
}

/// 进程内存储
///
/// 每个操作都在同一把锁内完成，所以评分更新天然是原子的。
/// 用于配置驱动的部署和测试。
#[derive(Default)]
pub struct MemoryChannelStore {
    state: Mutex<MemoryState>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 直接改写健康字段，只供测试构造场景
#[cfg(any(test, feature = "test-utils"))]
impl MemoryChannelStore {
    /// 直接改写上次检查时间，测试恢复逻辑时使用
    pub fn set_last_check_time(
        &self,
        model_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.model_mut(model_id)?.last_check_time = at;
        Ok(())
    }

    /// 直接设置权重，测试选择分布时使用
    pub fn set_weight(&self, model_id: i64, weight: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.model_mut(model_id)?.weight = weight;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        Ok(self.state.lock().channels.values().cloned().collect())
    }

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>, StoreError> {
        Ok(self.state.lock().channels.get(&id).cloned())
    }

    async fn find_usable_models(
        &self,
        model_keys: &[String],
    ) -> Result<Vec<ChannelModel>, StoreError> {
        Ok(self
            .state
            .lock()
            .collect_models(model_keys, ChannelModel::is_usable))
    }

    async fn find_probe_models(
        &self,
        model_keys: &[String],
    ) -> Result<Vec<ChannelModel>, StoreError> {
        Ok(self
            .state
            .lock()
            .collect_models(model_keys, |m| m.hard_limit.is_usable()))
    }

    async fn apply_success(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.model_mut(model_id)?.record_success(limits, Utc::now());
        Ok(())
    }

    async fn apply_failure(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.model_mut(model_id)?.record_failure(limits, Utc::now());
        Ok(())
    }

    async fn recover_suspended(
        &self,
        cutoff: DateTime<Utc>,
        reset: &RecoveryReset,
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut touched = 0;
        for model in state.models.values_mut() {
            if model.is_recoverable(cutoff) {
                model.reset_for_recovery(reset, now);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn create_channel(
        &self,
        channel: NewChannel,
        initial_weight: i32,
    ) -> Result<Channel, StoreError> {
        let hash = channel.content_hash();
        let now = Utc::now();
        let mut state = self.state.lock();

        let existing = state
            .channels
            .values()
            .find(|c| c.content_hash == hash)
            .cloned();
        let stored = match existing {
            Some(found) => found,
            None => {
                state.next_channel_id += 1;
                let created = Channel {
                    id: state.next_channel_id,
                    name: channel.name,
                    channel_type: channel.channel_type,
                    base_url: channel.base_url,
                    api_key: channel.api_key,
                    content_hash: hash,
                    status: channel.status,
                    created_at: now,
                    updated_at: now,
                };
                state.channels.insert(created.id, created.clone());
                created
            }
        };

        for model_key in channel.models {
            let exists = state
                .models
                .values()
                .any(|m| m.channel_id == stored.id && m.model_key == model_key);
            if !exists {
                state.next_model_id += 1;
                let id = state.next_model_id;
                state
                    .models
                    .insert(id, ChannelModel::new(id, stored.id, model_key, initial_weight));
            }
        }

        Ok(stored)
    }

    async fn delete_channel(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let removed = state.channels.remove(&id).is_some();
        state.models.retain(|_, m| m.channel_id != id);
        Ok(removed)
    }

    async fn set_channel_status(&self, id: i64, status: ChannelStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(&id)
            .ok_or(StoreError::ChannelNotFound(id))?;
        channel.status = status;
        channel.updated_at = Utc::now();
        Ok(())
    }

    async fn set_hard_limit(&self, model_id: i64, limit: LimitState) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.model_mut(model_id)?.hard_limit = limit;
        Ok(())
    }

    async fn get_channel_model(&self, model_id: i64) -> Result<Option<ChannelModel>, StoreError> {
        Ok(self.state.lock().models.get(&model_id).cloned())
    }

    async fn list_channel_models(
        &self,
        channel_id: i64,
    ) -> Result<Vec<ChannelModel>, StoreError> {
        Ok(self
            .state
            .lock()
            .models
            .values()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect())
    }
}
