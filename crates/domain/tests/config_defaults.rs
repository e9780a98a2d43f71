use cs_domain::config::{Config, ConfigSeverity};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 4380
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(!config.server.cors.allowed_origins.is_empty());
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn cors_config_parses_custom_origins() {
    let toml_str = r#"
[server.cors]
allowed_origins = ["https://myapp.com", "http://localhost:3000"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.cors.allowed_origins.len(), 2);
    assert!(config.server.cors.allowed_origins.contains(&"https://myapp.com".to_string()));
}

#[test]
fn default_config_validates_clean() {
    let config = Config::default();
    let issues = config.validate();
    assert!(
        issues.iter().all(|i| i.severity != ConfigSeverity::Error),
        "default config should have no errors: {issues:?}"
    );
}

#[test]
fn zero_port_is_an_error() {
    let toml_str = r#"
[server]
port = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.port"));
}

#[test]
fn keep_recent_must_leave_room_to_compress() {
    let toml_str = r#"
[history]
compress_after_turns = 10
keep_recent = 10
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "history.keep_recent"));
}

#[test]
fn wildcard_cors_warns() {
    let toml_str = r#"
[server.cors]
allowed_origins = ["*"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Warning
            && i.field == "server.cors.allowed_origins"));
}

#[test]
fn full_config_file_round_trips() {
    let toml_str = r#"
[server]
port = 9000
host = "0.0.0.0"

[context]
active_window_turns = 3

[history]
compress_after_turns = 40
keep_recent = 6

[sessions]
state_dir = "/var/lib/callsign/sessions"
stale_after_minutes = 120

[jobs]
turn_timeout_secs = 120

[collab]
base_url = "http://reasoner.internal:8750"
max_retries = 4
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.context.active_window_turns, 3);
    assert_eq!(config.history.compress_after_turns, 40);
    assert_eq!(config.sessions.stale_after_minutes, 120);
    assert_eq!(config.jobs.turn_timeout_secs, 120);
    assert_eq!(config.collab.base_url, "http://reasoner.internal:8750");
    assert_eq!(config.collab.max_retries, 4);
    assert!(config.validate().iter().all(|i| i.severity != ConfigSeverity::Error));
}
