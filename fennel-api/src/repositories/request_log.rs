use crate::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fennel_relay::{RelayLogEntry, RequestLogSink};
use tracing::warn;

/// 将转发结果写入 request_logs 表
#[derive(Clone)]
pub struct PgRequestLogSink {
    db: Database,
}

impl PgRequestLogSink {
    pub fn new(db: Database) -> Self {
        PgRequestLogSink { db }
    }

    pub async fn insert(&self, entry: &RelayLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO request_logs
                (model_id, model_key, channel_id, channel_name, kind, attempts, success,
                 latency_ms, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.model_id)
        .bind(&entry.model_key)
        .bind(entry.channel_id)
        .bind(&entry.channel_name)
        .bind(entry.kind.as_str())
        .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
        .bind(entry.success)
        .bind(i64::try_from(entry.latency_ms).unwrap_or(i64::MAX))
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(self.db.get_pool())
        .await
        .context("Failed to insert request log")?;
        Ok(())
    }

    pub async fn count_for_model(&self, model_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs WHERE model_id = $1")
            .bind(model_id)
            .fetch_one(self.db.get_pool())
            .await
            .context("Failed to count request logs")?;
        Ok(count)
    }
}

#[async_trait]
impl RequestLogSink for PgRequestLogSink {
    async fn record(&self, entry: RelayLogEntry) {
        // 日志写入失败不影响转发结果
        if let Err(e) = self.insert(&entry).await {
            warn!("Dropping request log for '{}': {:#}", entry.model_id, e);
        }
    }
}
