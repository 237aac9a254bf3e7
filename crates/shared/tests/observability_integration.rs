//! 可观测性模块集成测试
//!
//! 测试 metrics、tracing 初始化以及配置的核心功能。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use notify_shared::observability::metrics::{
        names, record_dispatched, record_rate_limited, record_submitted, record_token_cache_hit,
        record_token_issued,
    };

    #[test]
    fn test_record_without_recorder() {
        // 未安装 recorder 时记录指标不应 panic
        record_submitted("ops-bot");
        record_dispatched("ops-bot", "webhook", "success");
        record_dispatched("notify-app", "app", "failure");
        record_rate_limited();
        record_token_issued("notify-app");
        record_token_cache_hit("notify-app");
    }

    #[test]
    fn test_metric_names_share_prefix() {
        for name in [
            names::MESSAGES_SUBMITTED,
            names::MESSAGES_DISPATCHED,
            names::RATE_LIMITED,
            names::TOKENS_ISSUED,
            names::TOKEN_CACHE_HITS,
        ] {
            assert!(name.starts_with("notify_"), "{name}");
            assert!(name.ends_with("_total"), "{name}");
        }
    }
}

// ============================================================================
// 初始化测试
// ============================================================================

mod init_tests {
    use notify_shared::observability::{self, ObservabilityConfig};

    #[test]
    fn test_init_only_once() {
        let config = ObservabilityConfig {
            service_name: "lark-notifier".to_string(),
            log_level: "debug".to_string(),
            ..Default::default()
        };

        let guard = observability::init(&config).unwrap();
        assert!(!guard.metrics_enabled());

        // 全局 subscriber 已设置，重复初始化返回错误
        assert!(observability::init(&config).is_err());
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use notify_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig {
            service_name: "my-service".to_string(),
            metrics_enabled: true,
            metrics_port: 9091,
            log_level: "debug".to_string(),
            json_logs: true,
        };

        assert_eq!(config.service_name, "my-service");
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_port, 9091);
        assert!(config.json_logs);
    }
}

// ============================================================================
// 令牌缓存与限流策略联合测试
// ============================================================================

mod token_cache_tests {
    use std::time::Duration;

    use notify_shared::cache::{CacheError, CacheKey, ExpiringCache};
    use notify_shared::retry::RateLimitPolicy;

    #[tokio::test(start_paused = true)]
    async fn test_token_expires_after_ttl() {
        let cache = ExpiringCache::new();
        let key = CacheKey::lark_token("cli_a1b2");

        // 令牌有效期 7200 秒，提前 100 秒过期
        cache.set(key.clone(), "t-abc", 7200 - 100);

        tokio::time::sleep(Duration::from_secs(7000)).await;
        assert_eq!(cache.get(&key), Ok("t-abc".to_string()));

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(cache.get(&key), Err(CacheError::Expired));
    }

    #[test]
    fn test_default_policy_attempts() {
        let policy = RateLimitPolicy::with_max_retries(0);
        assert_eq!(policy.total_attempts(), 4);
        assert_eq!(policy.cooldown(Some("3")), Duration::from_secs(3));
        assert_eq!(policy.cooldown(None), Duration::from_secs(60));
    }
}
