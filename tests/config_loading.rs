//! Loading a configuration file and opening an engine from it.
use std::fs;

use uuid::Uuid;

use paragon_engine::config::{Config, EventSinkKind};
use paragon_engine::growth::GrowthEngine;

#[test]
fn engine_opens_from_a_written_config() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("growth");
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!(
            r#"
[storage]
data_dir = "{}"

[cache]
enabled = false

[events]
sink = "journal"

[rules]
attribute_cap = 3
"#,
            data_dir.display()
        ),
    )
    .unwrap();

    let config = tokio_test::block_on(Config::load(path.to_str().unwrap())).unwrap();
    config.validate().unwrap();
    assert_eq!(config.events.sink, EventSinkKind::Journal);
    assert_eq!(config.rules.attribute_cap, 3);
    assert_eq!(config.engine.request_timeout_ms, 50);

    let engine = GrowthEngine::open(&config).unwrap();
    let id = Uuid::new_v4();
    engine.progression().add_experience(id, 600, "boss").unwrap();
    for _ in 0..3 {
        engine
            .progression()
            .allocate_attribute_point(id, "strength")
            .unwrap();
    }
    // Custom cap applies.
    assert!(engine
        .progression()
        .allocate_attribute_point(id, "strength")
        .is_err());
    assert!(data_dir.exists());
    assert!(!engine.store().recent_events(10).unwrap().is_empty());
}

#[test]
fn unparsable_config_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[cache\nenabled = yes").unwrap();
    let err = tokio_test::block_on(Config::load(path.to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}
