use crate::config::{
    AppConfig, CliOverrides, FileConfig, PartialLlmConfig, PartialLoopConfig, PartialSearchConfig,
    load_project_config,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_project_config() {
    let temp_dir = TempDir::new().unwrap();
    let project_root = temp_dir.path();

    let trip_dir = project_root.join(".trip");
    fs::create_dir_all(&trip_dir).unwrap();

    let config_content = r#"
model = "llama-3.1-8b-instant"
temperature = 0.2

[llm]
max_retries = 5
retry_base_ms = 500

[search]
hotels_currency = "EUR"
max_hotels = 3

[agent]
max_rounds = 4
"#;

    fs::write(trip_dir.join("config.toml"), config_content).unwrap();

    let project_cfg = load_project_config(project_root).unwrap();

    assert_eq!(project_cfg.model, Some("llama-3.1-8b-instant".to_string()));
    assert_eq!(project_cfg.temperature, Some(0.2));

    let llm_cfg = project_cfg.llm.unwrap();
    assert_eq!(llm_cfg.max_retries, Some(5));
    assert_eq!(llm_cfg.retry_base_ms, Some(500));

    let search_cfg = project_cfg.search.unwrap();
    assert_eq!(search_cfg.hotels_currency, Some("EUR".to_string()));
    assert_eq!(search_cfg.max_hotels, Some(3));

    assert_eq!(project_cfg.agent.unwrap().max_rounds, Some(4));
}

#[test]
fn test_load_project_config_not_exists() {
    let temp_dir = TempDir::new().unwrap();
    let project_cfg = load_project_config(temp_dir.path()).unwrap();
    assert_eq!(project_cfg, FileConfig::default());
}

#[test]
fn test_load_project_config_malformed_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let trip_dir = temp_dir.path().join(".trip");
    fs::create_dir_all(&trip_dir).unwrap();
    fs::write(trip_dir.join("config.toml"), "model = [not toml").unwrap();

    let project_cfg = load_project_config(temp_dir.path()).unwrap();
    assert_eq!(project_cfg, FileConfig::default());
}

#[test]
fn test_merge_project_wins_over_user_file() {
    let project_cfg = FileConfig {
        llm: Some(PartialLlmConfig {
            max_retries: Some(1),
            ..Default::default()
        }),
        agent: Some(PartialLoopConfig {
            tool_timeout_ms: Some(1_000),
            ..Default::default()
        }),
        ..Default::default()
    };
    let file_cfg = FileConfig {
        temperature: Some(0.7),
        llm: Some(PartialLlmConfig {
            max_retries: Some(9),
            retry_base_ms: Some(42),
            ..Default::default()
        }),
        agent: Some(PartialLoopConfig {
            max_rounds: Some(3),
            tool_timeout_ms: Some(9_000),
            ..Default::default()
        }),
        ..Default::default()
    };

    let cfg = AppConfig::merge(
        CliOverrides::default(),
        PathBuf::from("."),
        project_cfg,
        file_cfg,
    );

    assert_eq!(cfg.temperature, 0.7);
    assert_eq!(cfg.llm.max_retries, 1);
    assert_eq!(cfg.llm.retry_base_ms, 42);
    assert_eq!(cfg.agent.max_rounds, 3);
    assert_eq!(cfg.agent.tool_timeout_ms, 1_000);
    assert_eq!(cfg.search.max_hotels, 5);
    assert_eq!(cfg.search.flights_currency, "USD");
}

#[test]
fn test_merge_cli_wins() {
    let cli = CliOverrides {
        model: Some("cli-model".into()),
        max_rounds: Some(2),
        stream_delay_ms: Some(10),
        ..Default::default()
    };
    let project_cfg = FileConfig {
        model: Some("project-model".into()),
        stream_delay_ms: Some(50),
        agent: Some(PartialLoopConfig {
            max_rounds: Some(6),
            ..Default::default()
        }),
        ..Default::default()
    };

    let cfg = AppConfig::merge(cli, PathBuf::from("."), project_cfg, FileConfig::default());

    assert_eq!(cfg.model, "cli-model");
    assert_eq!(cfg.agent.max_rounds, 2);
    assert_eq!(cfg.stream_delay_ms, 10);
}

#[test]
fn test_merge_bounds_result_caps() {
    let project_cfg = FileConfig {
        search: Some(PartialSearchConfig {
            max_hotels: Some(8),
            max_flights: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let cfg = AppConfig::merge(
        CliOverrides::default(),
        PathBuf::from("."),
        project_cfg,
        FileConfig::default(),
    );
    assert_eq!(cfg.search.max_hotels, 5);
    assert_eq!(cfg.search.max_flights, 1);

    let zero_hotels = FileConfig {
        search: Some(PartialSearchConfig {
            max_hotels: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let cfg = AppConfig::merge(
        CliOverrides::default(),
        PathBuf::from("."),
        zero_hotels,
        FileConfig::default(),
    );
    assert_eq!(cfg.search.max_hotels, 1);
}
