use std::io::Write;

use serial_test::serial;
use tempfile::{tempdir, NamedTempFile};

use tourguide_cli::cli::runtime::{load_config, read_config_file};
use tourguide_cli::Config;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn missing_file_means_defaults() {
    let dir = tempdir().unwrap();
    let config = read_config_file(&dir.path().join("absent.yaml")).await.unwrap();
    assert_eq!(config, Config::default());
}

#[tokio::test]
async fn file_values_replace_defaults() {
    let file = yaml_file(
        "post_type: page\nplayback:\n  lookahead_timeout_ms: 1500\napi:\n  nonce: abc123\n",
    );
    let config = read_config_file(file.path()).await.unwrap();
    assert_eq!(config.post_type, "page");
    assert_eq!(config.playback.lookahead_timeout_ms, 1500);
    assert_eq!(config.playback.precondition_timeout_ms, 2000);
    assert_eq!(config.api.nonce.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn malformed_file_is_an_error() {
    let file = yaml_file("playback: [not, a, map]\n");
    let err = read_config_file(file.path()).await.unwrap_err();
    assert!(format!("{err:#}").contains("parsing"));
}

#[tokio::test]
#[serial]
async fn environment_overrides_the_file() {
    let file = yaml_file("playback:\n  click_grace_ms: 800\n  poll_interval_ms: 40\n");
    std::env::set_var("TOURGUIDE_CLICK_GRACE_MS", "25");
    let loaded = load_config(Some(&file.path().to_path_buf())).await;
    std::env::remove_var("TOURGUIDE_CLICK_GRACE_MS");

    let loaded = loaded.unwrap();
    assert_eq!(loaded.path, file.path());
    assert_eq!(loaded.config.playback.click_grace_ms, 25);
    assert_eq!(loaded.config.playback.poll_interval_ms, 40);
}

#[test]
fn shipped_config_parses() {
    let raw = include_str!("../config/tourguide.yaml");
    let config: Config = serde_yaml::from_str(raw).unwrap();
    assert_eq!(config.playback, Config::default().playback);
}
