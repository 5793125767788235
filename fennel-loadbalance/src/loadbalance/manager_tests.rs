#[cfg(test)]
mod tests {
    use crate::loadbalance::manager::*;
    use chrono::{Duration, Utc};
    use fennel_core::channel::{ChannelStatus, ChannelType, LimitState, NewChannel};
    use fennel_core::config::model::BalanceSettings;
    use fennel_core::store::{ChannelStore, MemoryChannelStore};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn new_channel(key: &str, models: &[&str]) -> NewChannel {
        NewChannel {
            name: format!("channel-{key}"),
            channel_type: ChannelType::OpenAI,
            base_url: "https://api.test.com".to_string(),
            api_key: key.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            status: ChannelStatus::Enabled,
        }
    }

    fn mapping(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    async fn create_test_balancer(
        channels: &[(&str, &[&str])],
        model_mapping: HashMap<String, Vec<String>>,
    ) -> (Arc<MemoryChannelStore>, LoadBalancer) {
        let store = Arc::new(MemoryChannelStore::new());
        for (key, models) in channels {
            store
                .create_channel(new_channel(key, models), 20)
                .await
                .unwrap();
        }
        let balancer = LoadBalancer::new(store.clone(), model_mapping, BalanceSettings::default())
            .await
            .unwrap();
        (store, balancer)
    }

    async fn model_id(store: &MemoryChannelStore, channel_id: i64, key: &str) -> i64 {
        store
            .list_channel_models(channel_id)
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.model_key == key)
            .map(|m| m.id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_loaded_eagerly() {
        let (_store, balancer) =
            create_test_balancer(&[("sk-a", &["gpt-4"]), ("sk-b", &["gpt-4"])], HashMap::new())
                .await;
        assert_eq!(balancer.channels().len(), 2);
        assert!(balancer.channel(1).is_some());
    }

    #[tokio::test]
    async fn test_no_candidates_is_no_available() {
        let (_store, balancer) = create_test_balancer(&[("sk-a", &["gpt-4"])], HashMap::new()).await;
        let err = balancer.next_channel("claude-3").await.unwrap_err();
        assert!(matches!(err, BalanceError::NoAvailable { ref model } if model == "claude-3"));
    }

    #[tokio::test]
    async fn test_zero_total_weight_is_no_available() {
        let (store, balancer) = create_test_balancer(&[("sk-a", &["gpt-4"])], HashMap::new()).await;
        let id = model_id(&store, 1, "gpt-4").await;
        store.set_weight(id, 0).unwrap();

        assert!(matches!(
            balancer.next_channel("gpt-4").await,
            Err(BalanceError::NoAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_selection_follows_weights() {
        let (store, balancer) =
            create_test_balancer(&[("sk-a", &["gpt-4"]), ("sk-b", &["gpt-4"])], HashMap::new())
                .await;
        store.set_weight(model_id(&store, 1, "gpt-4").await, 15).unwrap();
        store.set_weight(model_id(&store, 2, "gpt-4").await, 5).unwrap();

        let draws = 4_000;
        let mut first = 0;
        for _ in 0..draws {
            if balancer.next_channel("gpt-4").await.unwrap().channel.id == 1 {
                first += 1;
            }
        }
        let share = first as f64 / draws as f64;
        assert!((share - 0.75).abs() < 0.05, "share of channel 1 was {share}");
    }

    #[tokio::test]
    async fn test_alias_expansion_reaches_both_models() {
        let (_store, balancer) = create_test_balancer(
            &[("sk-a", &["gpt-4"]), ("sk-b", &["gpt-4-canary"])],
            mapping(&[("gpt-4", &["gpt-4-canary"])]),
        )
        .await;

        let mut served = std::collections::HashSet::new();
        for _ in 0..500 {
            let conf = balancer.next_channel("gpt-4").await.unwrap();
            assert!(conf.model_key == "gpt-4" || conf.model_key == "gpt-4-canary");
            served.insert(conf.model_key);
        }
        assert_eq!(served.len(), 2);

        for _ in 0..50 {
            let conf = balancer.next_channel("gpt-4-canary").await.unwrap();
            assert_eq!(conf.model_key, "gpt-4-canary");
            assert_eq!(conf.channel.id, 2);
        }
    }

    #[tokio::test]
    async fn test_expand_model_keeps_literal_first_and_dedupes() {
        let (_store, balancer) =
            create_test_balancer(&[], mapping(&[("a", &["b", "a", "b", "c"])])).await;
        assert_eq!(balancer.expand_model("a"), vec!["a", "b", "c"]);
        assert_eq!(balancer.expand_model("z"), vec!["z"]);
    }

    #[tokio::test]
    async fn test_failures_suspend_then_success_restores() {
        let (store, balancer) = create_test_balancer(&[("sk-a", &["gpt-4"])], HashMap::new()).await;
        let id = model_id(&store, 1, "gpt-4").await;

        for _ in 0..6 {
            balancer.fail_cb(id).await.unwrap();
        }
        assert!(balancer.next_channel("gpt-4").await.is_ok());

        balancer.fail_cb(id).await.unwrap();
        let row = store.get_channel_model(id).await.unwrap().unwrap();
        assert_eq!(row.soft_limit, LimitState::Limited);
        assert_eq!(row.error_count, 6);
        assert_eq!(row.weight, 13);
        assert!(matches!(
            balancer.next_channel("gpt-4").await,
            Err(BalanceError::NoAvailable { .. })
        ));

        balancer.success_cb(id).await.unwrap();
        let row = store.get_channel_model(id).await.unwrap().unwrap();
        assert_eq!(row.soft_limit, LimitState::Usable);
        assert_eq!(row.error_count, 5);
        assert_eq!(row.weight, 14);
        assert_eq!(row.total_count, 8);
        assert!(balancer.next_channel("gpt-4").await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped() {
        let (store, balancer) =
            create_test_balancer(&[("sk-a", &["gpt-4"]), ("sk-b", &["gpt-4"])], HashMap::new())
                .await;
        store.set_channel_status(1, ChannelStatus::Disabled).await.unwrap();
        balancer.refresh_channels().await.unwrap();

        for _ in 0..100 {
            assert_eq!(balancer.next_channel("gpt-4").await.unwrap().channel.id, 2);
        }
    }

    #[tokio::test]
    async fn test_snapshot_miss_loads_channel_once() {
        let (store, balancer) = create_test_balancer(&[], HashMap::new()).await;
        assert!(balancer.channels().is_empty());

        let channel = store
            .create_channel(new_channel("sk-late", &["gpt-4o"]), 20)
            .await
            .unwrap();
        let conf = balancer.next_channel("gpt-4o").await.unwrap();
        assert_eq!(conf.channel.id, channel.id);
        assert!(balancer.channel(channel.id).is_some());
    }

    #[tokio::test]
    async fn test_upsert_and_remove_snapshot_entries() {
        let (_store, balancer) = create_test_balancer(&[("sk-a", &["gpt-4"])], HashMap::new()).await;

        let mut channel = balancer.channel(1).unwrap();
        channel.status = ChannelStatus::Disabled;
        balancer.upsert_channel(channel);
        assert!(matches!(
            balancer.next_channel("gpt-4").await,
            Err(BalanceError::NoAvailable { .. })
        ));

        let removed = balancer.remove_channel(1).unwrap();
        assert_eq!(removed.status, ChannelStatus::Disabled);
        assert!(balancer.channels().is_empty());

        // 快照缺失时从存储补载，存储里的渠道仍是启用状态
        assert_eq!(balancer.next_channel("gpt-4").await.unwrap().channel.id, 1);
        assert!(balancer.channel(1).is_some());
    }

    #[tokio::test]
    async fn test_recover_channel_models() {
        let (store, balancer) =
            create_test_balancer(&[("sk-a", &["gpt-4", "gpt-4o"])], HashMap::new()).await;
        let old = model_id(&store, 1, "gpt-4").await;
        let recent = model_id(&store, 1, "gpt-4o").await;
        for _ in 0..7 {
            balancer.fail_cb(old).await.unwrap();
            balancer.fail_cb(recent).await.unwrap();
        }
        store
            .set_last_check_time(old, Utc::now() - Duration::hours(3))
            .unwrap();

        assert_eq!(balancer.recover_channel_models().await.unwrap(), 1);
        let row = store.get_channel_model(old).await.unwrap().unwrap();
        assert_eq!(row.soft_limit, LimitState::Usable);
        assert_eq!(row.error_count, 3);
        assert_eq!(row.weight, 10);

        let row = store.get_channel_model(recent).await.unwrap().unwrap();
        assert_eq!(row.soft_limit, LimitState::Limited);

        assert_eq!(balancer.recover_channel_models().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_model_mapping_keys_sorted() {
        let (_store, balancer) = create_test_balancer(
            &[],
            mapping(&[("zeta", &["z1"]), ("alpha", &["a1"]), ("mid", &["m1"])]),
        )
        .await;
        assert_eq!(balancer.get_model_mapping_keys(), vec!["alpha", "mid", "zeta"]);

        balancer.change_model_mapping(mapping(&[("gpt-4", &["gpt-4-canary"])]));
        assert_eq!(balancer.get_model_mapping_keys(), vec!["gpt-4"]);
        assert_eq!(balancer.expand_model("gpt-4"), vec!["gpt-4", "gpt-4-canary"]);
    }

    #[tokio::test]
    async fn test_register_channel_is_idempotent_and_syncs_status() {
        let (store, balancer) = create_test_balancer(&[], HashMap::new()).await;
        let first = balancer
            .register_channel(new_channel("sk-a", &["gpt-4"]))
            .await
            .unwrap();

        let mut disabled = new_channel("sk-a", &["gpt-4"]);
        disabled.status = ChannelStatus::Disabled;
        let second = balancer.register_channel(disabled).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, ChannelStatus::Disabled);
        assert_eq!(store.list_channels().await.unwrap().len(), 1);
        assert_eq!(
            balancer.channel(first.id).map(|c| c.status),
            Some(ChannelStatus::Disabled)
        );
    }

    #[tokio::test]
    async fn test_probe_targets_include_suspended_rows() {
        let (store, balancer) = create_test_balancer(&[("sk-a", &["gpt-4"])], HashMap::new()).await;
        let id = model_id(&store, 1, "gpt-4").await;
        for _ in 0..7 {
            balancer.fail_cb(id).await.unwrap();
        }
        let targets = balancer.probe_targets("gpt-4").await.unwrap();
        assert_eq!(targets.len(), 1);

        store.set_hard_limit(id, LimitState::Limited).await.unwrap();
        assert!(balancer.probe_targets("gpt-4").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_served_model_keys() {
        let (_store, balancer) = create_test_balancer(
            &[("sk-a", &["gpt-4", "o1"]), ("sk-b", &["gpt-4", "embed"])],
            HashMap::new(),
        )
        .await;
        assert_eq!(
            balancer.served_model_keys().await.unwrap(),
            vec!["embed", "gpt-4", "o1"]
        );
    }
}
