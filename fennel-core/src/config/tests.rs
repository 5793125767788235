#[cfg(test)]
mod tests {
    use crate::channel::{ChannelStatus, ChannelType};
    use crate::config::loader::{load_config_from_path, parse_config};
    use crate::config::model::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn create_test_channel() -> ChannelConfig {
        ChannelConfig {
            name: "Test Channel".to_string(),
            channel_type: ChannelType::OpenAI,
            base_url: "https://api.test.com".to_string(),
            api_key: "test-api-key".to_string(),
            models: vec!["gpt-4".to_string(), "gpt-4-canary".to_string()],
            enabled: true,
        }
    }

    fn create_test_config() -> Config {
        let mut channels = HashMap::new();
        channels.insert("test-channel".to_string(), create_test_channel());

        let mut model_mapping = HashMap::new();
        model_mapping.insert("gpt-4".to_string(), vec!["gpt-4-canary".to_string()]);

        Config {
            model_mapping,
            channels,
            settings: GlobalSettings::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_settings() {
        let settings = GlobalSettings::default();
        assert_eq!(settings.balance.max_error_count, 6);
        assert_eq!(settings.balance.max_weight, 20);
        assert_eq!(settings.balance.initial_weight, 20);
        assert_eq!(settings.balance.recovery_window_seconds, 7200);
        assert_eq!(settings.balance.recovery_error_count, 3);
        assert_eq!(settings.balance.recovery_weight, 10);
        assert_eq!(settings.relay.max_attempts, 3);
        assert_eq!(settings.relay.feedback_queue_capacity, 1024);
        assert_eq!(settings.health_check.probe_delay_seconds, 5);
        assert_eq!(settings.health_check.cycle_interval_seconds, 3600);
        assert_eq!(settings.health_check.idle_interval_seconds, 60);
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn test_invalid_channel_empty_name() {
        let mut config = create_test_config();
        if let Some(channel) = config.channels.get_mut("test-channel") {
            channel.name = "  ".to_string();
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn test_invalid_channel_base_url() {
        let mut config = create_test_config();
        if let Some(channel) = config.channels.get_mut("test-channel") {
            channel.base_url = "ftp://api.test.com".to_string();
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid base_url"));
    }

    #[test]
    fn test_invalid_channel_no_models() {
        let mut config = create_test_config();
        if let Some(channel) = config.channels.get_mut("test-channel") {
            channel.models.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_channel_empty_key() {
        let mut config = create_test_config();
        if let Some(channel) = config.channels.get_mut("test-channel") {
            channel.api_key.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_model_mapping() {
        let mut config = create_test_config();
        config.model_mapping.insert("gpt-5".to_string(), vec![]);
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config
            .model_mapping
            .insert("gpt-5".to_string(), vec!["".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_balance_settings() {
        let mut config = create_test_config();
        config.settings.balance.recovery_weight = 21;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.settings.balance.recovery_error_count = 7;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.settings.balance.max_weight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_relay_attempts() {
        let mut config = create_test_config();
        config.settings.relay.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse_config(
            r#"
            [model_mapping]
            "gpt-4" = ["gpt-4-canary"]

            [channels.main]
            name = "Main"
            channel_type = "siliconflow"
            base_url = "https://api.siliconflow.cn/"
            api_key = "sk-test"
            models = ["gpt-4"]
            enabled = false

            [settings.balance]
            max_error_count = 4

            [settings.health_check]
            watch_models = ["gpt-4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.settings.balance.max_error_count, 4);
        assert_eq!(config.settings.balance.max_weight, 20);
        assert_eq!(config.settings.health_check.watch_models, vec!["gpt-4"]);
        assert_eq!(config.settings.relay.max_attempts, 3);

        let channel = config.channels["main"].to_new_channel();
        assert_eq!(channel.channel_type, ChannelType::SiliconFlow);
        assert_eq!(channel.base_url, "https://api.siliconflow.cn");
        assert_eq!(channel.status, ChannelStatus::Disabled);
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let result = parse_config(
            r#"
            [settings.relay]
            max_attempts = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [channels.main]
            name = "Main"
            base_url = "https://api.test.com"
            api_key = "sk-test"
            models = ["gpt-4o"]
            "#
        )
        .unwrap();

        let config = load_config_from_path(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels["main"].channel_type, ChannelType::OpenAI);
        assert!(config.channels["main"].enabled);

        assert!(load_config_from_path("/definitely/missing/config.toml").is_err());
    }

    #[test]
    fn test_known_model_keys_sorted_and_deduped() {
        let config = create_test_config();
        assert_eq!(
            config.known_model_keys(),
            vec!["gpt-4".to_string(), "gpt-4-canary".to_string()]
        );
    }
}
