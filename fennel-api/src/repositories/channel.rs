use crate::database::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fennel_core::channel::{
    Channel, ChannelModel, ChannelStatus, ChannelType, LimitState, NewChannel, RecoveryReset,
    ScoreLimits,
};
use fennel_core::store::{ChannelStore, StoreError};

const CHANNEL_COLUMNS: &str =
    "id, name, channel_type, base_url, api_key, content_hash, status, created_at, updated_at";
const MODEL_COLUMNS: &str = "id, channel_id, model_key, weight, error_count, soft_limit, \
     hard_limit, last_check_time, total_count";

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    name: String,
    channel_type: String,
    base_url: String,
    api_key: String,
    content_hash: String,
    status: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = StoreError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        let channel_type = row
            .channel_type
            .parse::<ChannelType>()
            .map_err(StoreError::backend)?;
        Ok(Channel {
            id: row.id,
            name: row.name,
            channel_type,
            base_url: row.base_url,
            api_key: row.api_key,
            content_hash: row.content_hash,
            status: ChannelStatus::from_i16(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChannelModelRow {
    id: i64,
    channel_id: i64,
    model_key: String,
    weight: i32,
    error_count: i32,
    soft_limit: i16,
    hard_limit: i16,
    last_check_time: DateTime<Utc>,
    total_count: i64,
}

impl From<ChannelModelRow> for ChannelModel {
    fn from(row: ChannelModelRow) -> Self {
        ChannelModel {
            id: row.id,
            channel_id: row.channel_id,
            model_key: row.model_key,
            weight: row.weight,
            error_count: row.error_count,
            soft_limit: LimitState::from_i16(row.soft_limit),
            hard_limit: LimitState::from_i16(row.hard_limit),
            last_check_time: row.last_check_time,
            total_count: row.total_count,
        }
    }
}

/// PostgreSQL 渠道存储
///
/// 评分增量都是单条 UPDATE，由数据库的行锁保证原子性。
#[derive(Clone)]
pub struct PgChannelStore {
    db: Database,
}

impl PgChannelStore {
    pub fn new(db: Database) -> Self {
        PgChannelStore { db }
    }

    async fn models_where(
        &self,
        model_keys: &[String],
        limit_clause: &str,
    ) -> Result<Vec<ChannelModel>, StoreError> {
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM channel_models \
             WHERE model_key = ANY($1) AND {limit_clause} ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ChannelModelRow>(&sql)
            .bind(model_keys)
            .fetch_all(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(ChannelModel::from).collect())
    }
}

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY id");
        let rows = sqlx::query_as::<_, ChannelRow>(&sql)
            .fetch_all(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        rows.into_iter().map(Channel::try_from).collect()
    }

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>, StoreError> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1");
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(id)
            .fetch_optional(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        row.map(Channel::try_from).transpose()
    }

    async fn find_usable_models(
        &self,
        model_keys: &[String],
    ) -> Result<Vec<ChannelModel>, StoreError> {
        self.models_where(model_keys, "soft_limit = 1 AND hard_limit = 1")
            .await
    }

    async fn find_probe_models(
        &self,
        model_keys: &[String],
    ) -> Result<Vec<ChannelModel>, StoreError> {
        self.models_where(model_keys, "hard_limit = 1").await
    }

    async fn apply_success(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE channel_models
            SET total_count = total_count + 1,
                error_count = GREATEST(error_count - 1, 0),
                weight = LEAST(weight + 1, $2),
                soft_limit = 1,
                last_check_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(model_id)
        .bind(limits.max_weight)
        .execute(self.db.get_pool())
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ModelNotFound(model_id));
        }
        Ok(())
    }

    async fn apply_failure(&self, model_id: i64, limits: &ScoreLimits) -> Result<(), StoreError> {
        // SET 中的表达式都读取更新前的值
        let result = sqlx::query(
            r#"
            UPDATE channel_models
            SET total_count = total_count + 1,
                soft_limit = CASE WHEN error_count + 1 > $2 THEN 2 ELSE 1 END,
                error_count = LEAST(error_count + 1, $2),
                weight = GREATEST(weight - 1, 0),
                last_check_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(model_id)
        .bind(limits.max_error_count)
        .execute(self.db.get_pool())
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ModelNotFound(model_id));
        }
        Ok(())
    }

    async fn recover_suspended(
        &self,
        cutoff: DateTime<Utc>,
        reset: &RecoveryReset,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE channel_models
            SET error_count = $1,
                weight = $2,
                soft_limit = 1,
                last_check_time = NOW()
            WHERE soft_limit = 2 AND hard_limit = 1 AND last_check_time < $3
            "#,
        )
        .bind(reset.error_count)
        .bind(reset.weight)
        .bind(cutoff)
        .execute(self.db.get_pool())
        .await
        .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn create_channel(
        &self,
        channel: NewChannel,
        initial_weight: i32,
    ) -> Result<Channel, StoreError> {
        let hash = channel.content_hash();
        let mut tx = self
            .db
            .get_pool()
            .begin()
            .await
            .map_err(StoreError::backend)?;

        let insert = format!(
            "INSERT INTO channels (name, channel_type, base_url, api_key, content_hash, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (content_hash) DO NOTHING \
             RETURNING {CHANNEL_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, ChannelRow>(&insert)
            .bind(&channel.name)
            .bind(channel.channel_type.as_str())
            .bind(&channel.base_url)
            .bind(&channel.api_key)
            .bind(&hash)
            .bind(channel.status.as_i16())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        let row = match inserted {
            Some(row) => row,
            None => {
                let select =
                    format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE content_hash = $1");
                sqlx::query_as::<_, ChannelRow>(&select)
                    .bind(&hash)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(StoreError::backend)?
            }
        };

        for model_key in &channel.models {
            sqlx::query(
                r#"
                INSERT INTO channel_models (channel_id, model_key, weight)
                VALUES ($1, $2, $3)
                ON CONFLICT (channel_id, model_key) DO NOTHING
                "#,
            )
            .bind(row.id)
            .bind(model_key)
            .bind(initial_weight)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)?;
        Channel::try_from(row)
    }

    async fn delete_channel(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_channel_status(&self, id: i64, status: ChannelStatus) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE channels SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_i16())
                .execute(self.db.get_pool())
                .await
                .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ChannelNotFound(id));
        }
        Ok(())
    }

    async fn set_hard_limit(&self, model_id: i64, state: LimitState) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE channel_models SET hard_limit = $2 WHERE id = $1")
            .bind(model_id)
            .bind(state.as_i16())
            .execute(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ModelNotFound(model_id));
        }
        Ok(())
    }

    async fn get_channel_model(&self, model_id: i64) -> Result<Option<ChannelModel>, StoreError> {
        let sql = format!("SELECT {MODEL_COLUMNS} FROM channel_models WHERE id = $1");
        let row = sqlx::query_as::<_, ChannelModelRow>(&sql)
            .bind(model_id)
            .fetch_optional(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        Ok(row.map(ChannelModel::from))
    }

    async fn list_channel_models(
        &self,
        channel_id: i64,
    ) -> Result<Vec<ChannelModel>, StoreError> {
        let sql =
            format!("SELECT {MODEL_COLUMNS} FROM channel_models WHERE channel_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, ChannelModelRow>(&sql)
            .bind(channel_id)
            .fetch_all(self.db.get_pool())
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(ChannelModel::from).collect())
    }
}
