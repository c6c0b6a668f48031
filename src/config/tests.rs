use std::io::Write;

use super::*;

fn cli(args: &[&str]) -> CliArgs {
    CliArgs::parse_from(args)
}

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.ttl, Duration::from_secs(3600));
    assert_eq!(settings.cache.key_prefix, "wcapi_");
    assert_eq!(settings.cache.memory_capacity.get(), 10_000);
    assert_eq!(settings.cache.invalidation_log_capacity.get(), 1000);
    assert_eq!(settings.cache.recent_activity_limit, 20);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(60);
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        cache_ttl_seconds: Some(120),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.ttl, Duration::from_secs(120));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn blank_prefix_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.key_prefix = Some("  ".to_string());

    let err = Settings::from_raw(raw).expect_err("blank prefix must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.key_prefix",
            ..
        }
    ));
}

#[test]
fn zero_capacities_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.memory_capacity = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.invalidation_log_capacity = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown level must fail");
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn cache_config_mirrors_settings() {
    let mut raw = RawSettings::default();
    raw.cache.enabled = Some(false);
    raw.cache.key_prefix = Some("shop_".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");

    let config = settings.cache_config();
    assert!(!config.enabled);
    assert_eq!(config.key_prefix, "shop_");
    assert_eq!(config.ttl_seconds, 3600);
}

#[test]
fn config_file_values_are_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    writeln!(
        file,
        "[cache]\nttl_seconds = 90\nkey_prefix = \"store_\"\n\n[logging]\nlevel = \"warn\""
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = cli(&["catalog-cache", "--config-file", &path, "key", "products"]);
    let settings = load(&args).expect("settings from file");

    assert_eq!(settings.cache.ttl, Duration::from_secs(90));
    assert_eq!(settings.cache.key_prefix, "store_");
    assert_eq!(settings.logging.level, LevelFilter::WARN);
}

#[test]
fn missing_config_file_fails() {
    let args = cli(&[
        "catalog-cache",
        "--config-file",
        "/nonexistent/catalog-cache.toml",
        "key",
        "products",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn parse_key_arguments() {
    let args = cli(&[
        "catalog-cache",
        "key",
        "products",
        "--param",
        "page=2",
        "-p",
        "search=red shirt",
    ]);

    match args.command {
        Command::Key(key) => {
            assert_eq!(key.prefix, "products");
            assert_eq!(
                key.params,
                vec![
                    ("page".to_string(), "2".to_string()),
                    ("search".to_string(), "red shirt".to_string()),
                ]
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn malformed_param_is_rejected() {
    let result = CliArgs::try_parse_from(["catalog-cache", "key", "products", "--param", "page"]);
    assert!(result.is_err());
}

#[test]
fn parse_replay_with_global_overrides() {
    let args = cli(&[
        "catalog-cache",
        "replay",
        "/tmp/fixture.toml",
        "--log-json",
        "true",
        "--cache-key-prefix",
        "shop_",
    ]);

    match args.command {
        Command::Replay(replay) => {
            assert_eq!(replay.fixture, std::path::Path::new("/tmp/fixture.toml"));
        }
        _ => panic!("wrong command parsed"),
    }
    assert_eq!(args.overrides.log_json, Some(true));
    assert_eq!(args.overrides.cache_key_prefix.as_deref(), Some("shop_"));
}
