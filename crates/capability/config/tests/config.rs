use domain::Tier;
use pmac_config::{AppConfig, ConfigError};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::remove_var("PMAC_HOST");
    }
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing(_))));

    unsafe {
        std::env::set_var("PMAC_HOST", "172.23.243.156");
        std::env::set_var("PMAC_PORT", "1025");
        std::env::set_var("PMAC_TIMEOUT_MS", "250");
        std::env::set_var("PMAC_FLUSH_BEFORE_WRITE", "off");
        std::env::set_var("PMAC_MONITOR_FAST", "#1P #2P");
        std::env::set_var("PMAC_MONITOR_SLOW", "I10");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.pmac_host, "172.23.243.156");
    assert_eq!(config.timeout_ms, 250);
    assert!(!config.flush_before_write);
    assert_eq!(config.medium_period_ms, 2000);
    assert_eq!(config.max_reply_bytes, 1024);
    assert_eq!(config.monitor_variables(Tier::Fast), ["#1P", "#2P"]);
    assert_eq!(config.monitor_variables(Tier::Slow), ["I10"]);
    assert!(config.monitor_variables(Tier::PreFast).is_empty());

    unsafe {
        std::env::set_var("PMAC_FAST_PERIOD_MS", "0");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "PMAC_FAST_PERIOD_MS"
    ));
}
