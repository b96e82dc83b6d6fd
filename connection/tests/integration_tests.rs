//! Integration tests against a live MySQL server.
//!
//! Disabled by default so `cargo test` stays hermetic. To run them:
//! 1. Copy `connection/tests/test-config.toml.example` to
//!    `connection/tests/test-config.yaml` and fill in your server details.
//! 2. `cargo test --package connection --test integration_tests -- --ignored`

use std::fs;
use std::path::Path;

use connection::api::AnyConnection;
use connection::config::ConnectConfig;
use protocol::value::Field;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TestConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    #[serde(default)]
    database: Option<String>,
}

fn load_test_config() -> Option<TestConfig> {
    let path = Path::new("connection/tests/test-config.yaml");
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&content).ok()
}

fn connect() -> AnyConnection {
    let cfg = load_test_config().expect("connection/tests/test-config.yaml not found");
    let mut config = ConnectConfig::new(cfg.host, cfg.port, cfg.username, cfg.password);
    if let Some(db) = cfg.database {
        config = config.with_database(db);
    }
    AnyConnection::connect(config).expect("failed to connect to MySQL server")
}

#[test]
#[ignore]
fn connect_and_select_constant() {
    let mut conn = connect();
    let result = conn.query("SELECT 1 + 1 AS result").expect("query failed");
    match result {
        connection::api::QueryResult::Rows(rows) => {
            let resolved = rows.resolve().expect("resolve failed");
            assert_eq!(resolved.len(), 1);
            assert_eq!(resolved[0][0].as_i64().unwrap(), 2);
        }
        connection::api::QueryResult::Ok { .. } => panic!("expected a result set"),
    }
}

#[test]
#[ignore]
fn prepare_execute_and_close() {
    let mut conn = connect();
    let stmt = conn.prepare("SELECT ? + ?").expect("prepare failed");
    assert_eq!(stmt.param_count(), 2);

    let result = conn
        .execute(&stmt, vec![Field::Int(1), Field::Int(41)])
        .expect("execute failed");
    match result {
        connection::api::QueryResult::Rows(rows) => {
            let resolved = rows.resolve().expect("resolve failed");
            assert_eq!(resolved[0][0].as_i64().unwrap(), 42);
        }
        connection::api::QueryResult::Ok { .. } => panic!("expected a result set"),
    }

    conn.close_statement(stmt).expect("close_statement failed");
}

#[test]
#[ignore]
fn ping_and_reset() {
    let mut conn = connect();
    conn.ping().expect("ping failed");
    conn.reset().expect("reset failed");
}

#[test]
fn connect_to_nonexistent_host_fails() {
    let config = ConnectConfig::new("nonexistent.invalid", 9999, "test", "test");
    let result = AnyConnection::connect(config);
    assert!(result.is_err());
    match result.err().unwrap() {
        common::err::decode_error::ReError::IoError(_) => {}
        other => panic!("unexpected error type: {:?}", other),
    }
}
