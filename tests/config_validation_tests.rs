//! Config Validation Tests
//!
//! Exercises TOML loading, unknown-key warnings and range validation
//! independently from the rest of the pipeline.

use exo_classifier::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use exo_classifier::config::{ConfigError, SemiMajorAxisSource, ServiceConfig};

// ============================================================================
// Typo detection
// ============================================================================

#[test]
fn typo_in_rule_name_warns_with_suggestion() {
    let toml_str = r#"
[correction.rules]
snr_excelent = 18.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "correction.rules.snr_excelent");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("correction.rules.snr_excellent"),
        "Should suggest the correct spelling"
    );
}

#[test]
fn unknown_section_warns() {
    let warnings = validate_unknown_keys("[telemetry]\nenabled = true\n");
    let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
    assert!(fields.contains(&"telemetry"));
    assert!(fields.contains(&"telemetry.enabled"));
}

#[test]
fn suggestion_prefers_closest_key() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("server.max_batch_row", &known).as_deref(),
        Some("server.max_batch_rows")
    );
}

#[test]
fn unknown_keys_do_not_break_loading() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("exo.toml");
    std::fs::write(&path, "[server]\nadress = \"1.2.3.4:1\"\nmax_batch_rows = 50\n").expect("write");
    let config = ServiceConfig::load_from_file(&path).expect("typos only warn");
    assert_eq!(config.server.max_batch_rows, 50);
    assert_eq!(config.server.addr, ServiceConfig::default().server.addr);
}

// ============================================================================
// Range validation
// ============================================================================

#[test]
fn default_config_validates() {
    assert!(ServiceConfig::default().validate().is_ok());
}

#[test]
fn validation_collects_every_violation() {
    let mut config = ServiceConfig::default();
    config.correction.blend_weight = 2.0;
    config.correction.rules.depth_min = 0.5;
    config.server.max_batch_rows = 0;
    config.training.test_fraction = 1.5;

    let Err(ConfigError::Validation(errors)) = config.validate() else {
        panic!("expected validation errors");
    };
    assert!(errors.len() >= 4, "{errors:?}");
    for needle in ["blend_weight", "correction.rules.depth", "max_batch_rows", "test_fraction"] {
        assert!(errors.iter().any(|e| e.contains(needle)), "no error mentions {needle}");
    }
}

#[test]
fn fire_threshold_above_hundred_rejected() {
    let mut config = ServiceConfig::default();
    config.correction.fire_threshold = 101;
    assert!(config.validate().is_err());
}

#[test]
fn partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("exo.toml");
    std::fs::write(
        &path,
        r#"
[properties]
semi_major_axis_source = "learned"

[correction]
enabled = false
"#,
    )
    .expect("write");

    let config = ServiceConfig::load_from_file(&path).expect("load");
    assert_eq!(config.properties.semi_major_axis_source, SemiMajorAxisSource::Learned);
    assert!(!config.correction.enabled);
    assert_eq!(config.correction.fire_threshold, 90);
    assert_eq!(config.training.seed, ServiceConfig::default().training.seed);
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("exo.toml");
    let mut config = ServiceConfig::default();
    config.models.disabled_members = vec!["logistic_regression".to_string()];
    config.save_to_file(&path).expect("save");

    let back = ServiceConfig::load_from_file(&path).expect("load");
    assert_eq!(back.models.disabled_members, config.models.disabled_members);
    assert!(validate_unknown_keys(&std::fs::read_to_string(&path).expect("read")).is_empty());
}

#[test]
fn missing_file_is_io_error() {
    let err = ServiceConfig::load_from_file(std::path::Path::new("/nonexistent/exo.toml"))
        .expect_err("must fail");
    assert!(matches!(err, ConfigError::Io(..)));
}
