use fennel_loadbalance::LoadBalancer;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 评分反馈，只携带渠道模型记录 id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Success(i64),
    Failure(i64),
}

/// 有界反馈队列
///
/// 上报永不阻塞，队列满时丢弃并告警。由单个 worker 顺序写入存储，
/// 所有发送端释放后 worker 处理完剩余反馈再退出。
#[derive(Clone)]
pub struct FeedbackQueue {
    tx: mpsc::Sender<Feedback>,
}

impl FeedbackQueue {
    pub fn spawn(balancer: Arc<LoadBalancer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(drain(balancer, rx));
        (Self { tx }, worker)
    }

    /// 返回是否成功入队
    pub fn report(&self, feedback: Feedback) -> bool {
        match self.tx.try_send(feedback) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!("Feedback queue is full, dropping {:?}", dropped);
                false
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!("Feedback worker has stopped, dropping {:?}", dropped);
                false
            }
        }
    }

    pub fn success(&self, model_record_id: i64) -> bool {
        self.report(Feedback::Success(model_record_id))
    }

    pub fn failure(&self, model_record_id: i64) -> bool {
        self.report(Feedback::Failure(model_record_id))
    }
}

async fn drain(balancer: Arc<LoadBalancer>, mut rx: mpsc::Receiver<Feedback>) {
    while let Some(feedback) = rx.recv().await {
        let result = match feedback {
            Feedback::Success(id) => balancer.success_cb(id).await,
            Feedback::Failure(id) => balancer.fail_cb(id).await,
        };
        if let Err(e) = result {
            warn!("Failed to apply {:?}: {}", feedback, e);
        }
    }
    debug!("Feedback worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use fennel_core::channel::{ChannelStatus, ChannelType, NewChannel};
    use fennel_core::config::model::BalanceSettings;
    use fennel_core::store::{ChannelStore, MemoryChannelStore};
    use std::collections::HashMap;

    async fn balancer_with_model() -> (Arc<MemoryChannelStore>, Arc<LoadBalancer>, i64) {
        let store = Arc::new(MemoryChannelStore::new());
        let channel = store
            .create_channel(
                NewChannel {
                    name: "a".to_string(),
                    channel_type: ChannelType::OpenAI,
                    base_url: "https://api.test.com".to_string(),
                    api_key: "sk-a".to_string(),
                    models: vec!["gpt-4".to_string()],
                    status: ChannelStatus::Enabled,
                },
                20,
            )
            .await
            .unwrap();
        let model_id = store.list_channel_models(channel.id).await.unwrap()[0].id;
        let balancer = Arc::new(
            LoadBalancer::new(store.clone(), HashMap::new(), BalanceSettings::default())
                .await
                .unwrap(),
        );
        (store, balancer, model_id)
    }

    #[tokio::test]
    async fn test_worker_applies_reports_then_exits() {
        let (store, balancer, id) = balancer_with_model().await;
        let (queue, worker) = FeedbackQueue::spawn(balancer, 16);

        assert!(queue.failure(id));
        assert!(queue.failure(id));
        assert!(queue.success(id));
        drop(queue);
        worker.await.unwrap();

        let row = store.get_channel_model(id).await.unwrap().unwrap();
        assert_eq!(row.total_count, 3);
        assert_eq!(row.error_count, 1);
        assert_eq!(row.weight, 19);
    }

    #[tokio::test]
    async fn test_unknown_record_does_not_stop_worker() {
        let (store, balancer, id) = balancer_with_model().await;
        let (queue, worker) = FeedbackQueue::spawn(balancer, 16);

        queue.success(9_999);
        queue.failure(id);
        drop(queue);
        worker.await.unwrap();

        assert_eq!(store.get_channel_model(id).await.unwrap().unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_report_after_worker_stopped_is_dropped() {
        let (_store, balancer, id) = balancer_with_model().await;
        let (queue, worker) = FeedbackQueue::spawn(balancer, 1);
        worker.abort();
        let _ = worker.await;
        assert!(!queue.success(id));
    }
}
