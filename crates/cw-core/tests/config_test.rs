use cw_core::config::{Config, LogFormat};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, LogFormat::Pretty);
    assert_eq!(cfg.agent.gateway_url, "http://127.0.0.1:4943");
    assert!(cfg.agent.canister_id.is_none());
    assert!(cfg.agent.request_timeout().is_none());
    assert_eq!(cfg.refresh.active_poll_ms, 5_000);
    assert_eq!(cfg.refresh.idle_poll_ms, 60_000);
    assert_eq!(cfg.refresh.due_slack_ms, 3_000);
    assert_eq!(cfg.verify.delay_ms, 2_500);
    assert_eq!(cfg.verify.tolerance_ms, 0);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("gateway_url"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.refresh, cfg.refresh);
    assert_eq!(parsed.verify, cfg.verify);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[agent]
canister_id = "rrkah-fqaaa-aaaaa-aaaaq-cai"

[refresh]
active_poll_ms = 2000
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(
        cfg.agent.canister_id.as_deref(),
        Some("rrkah-fqaaa-aaaaa-aaaaq-cai")
    );
    assert_eq!(cfg.refresh.active_poll_ms, 2_000);
    // defaults fill in the rest
    assert_eq!(cfg.refresh.idle_poll_ms, 60_000);
    assert_eq!(cfg.general.log_level, "info");
    cfg.validate().expect("config validates");
}

#[test]
fn json_log_format_parses() {
    let cfg: Config = toml::from_str("[general]\nlog_format = \"json\"\n").expect("parse");
    assert_eq!(cfg.general.log_format, LogFormat::Json);
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[verify]\ndelay_ms = 500\n").expect("write config");

    let cfg = Config::load_from(&path).expect("load config");
    assert_eq!(cfg.verify.delay_ms, 500);
    assert_eq!(cfg.verify.tolerance_ms, 0);
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Config::load_from(dir.path().join("absent.toml")).expect_err("missing file");
    assert!(err.to_string().starts_with("io:"));
}

#[test]
fn active_poll_longer_than_idle_fails_validation() {
    let mut cfg = Config::default();
    cfg.refresh.active_poll_ms = 120_000;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("active_poll_ms"));
}

#[test]
fn bad_gateway_url_fails_validation() {
    let mut cfg = Config::default();
    cfg.agent.gateway_url = "localhost:4943".into();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("gateway_url"));
}

#[test]
fn zero_verify_delay_fails_validation() {
    let mut cfg = Config::default();
    cfg.verify.delay_ms = 0;
    assert!(cfg.validate().is_err());
}
