use std::sync::Mutex;

use tempfile::NamedTempFile;

use target_capture::config::{CaptureMode, EngineSettings};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAPTURE_CONFIG",
        "CAPTURE_MODE",
        "CAPTURE_POOL_SIZE",
        "CAPTURE_MEMORY_LIMIT",
        "CAPTURE_THR_QUALITY",
        "CAPTURE_MISS_TIME_LIMIT",
        "CAPTURE_STORE_RGB",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EngineSettings::load().expect("load defaults");
    assert_eq!(cfg, EngineSettings::default());
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "pool_size": 4,
        "memory_limit": 65536,
        "mode": "fast",
        "capture": {
            "thr_quality": 0.7,
            "fast_interval": 15,
            "fast_capture_cap": 2,
            "miss_grace": 5
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CAPTURE_CONFIG", file.path());
    std::env::set_var("CAPTURE_MODE", "cycle");
    std::env::set_var("CAPTURE_MISS_TIME_LIMIT", "12");
    std::env::set_var("CAPTURE_STORE_RGB", "true");

    let cfg = EngineSettings::load().expect("load config");

    assert_eq!(cfg.pool_size, 4);
    assert_eq!(cfg.memory_limit, 65536);
    assert_eq!(cfg.mode, CaptureMode::Cycle);
    assert!(cfg.store_rgb);
    assert_eq!(cfg.capture.thr_quality, 0.7);
    assert_eq!(cfg.capture.fast_interval, 15);
    assert_eq!(cfg.capture.fast_capture_cap, 2);
    assert_eq!(cfg.capture.miss_time_limit, 12);
    assert_eq!(cfg.capture.miss_grace, 5);
    // Unset fields keep their defaults.
    assert_eq!(cfg.capture.cycle_interval, 20);
    assert!(cfg.capture.auto_fast_capture);

    clear_env();
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
pool_size = 3
mode = "auto"

[capture]
thr_quality = 0.8
thr_quality_high = 0.9
auto_time_limit = 60
auto_fast_capture = false
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("CAPTURE_CONFIG", file.path());
    std::env::set_var("CAPTURE_POOL_SIZE", "6");

    let cfg = EngineSettings::load().expect("load config");

    assert_eq!(cfg.pool_size, 6);
    assert_eq!(cfg.mode, CaptureMode::Auto);
    assert_eq!(cfg.capture.thr_quality, 0.8);
    assert_eq!(cfg.capture.thr_quality_high, 0.9);
    assert_eq!(cfg.capture.auto_time_limit, 60);
    assert!(!cfg.capture.auto_fast_capture);

    clear_env();
}

#[test]
fn malformed_env_value_names_the_variable() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAPTURE_POOL_SIZE", "many");
    let err = EngineSettings::load().unwrap_err();
    assert!(err.to_string().contains("CAPTURE_POOL_SIZE"), "{}", err);

    clear_env();
    std::env::set_var("CAPTURE_MODE", "burst");
    let err = EngineSettings::load().unwrap_err();
    assert!(err.to_string().contains("CAPTURE_MODE"), "{}", err);

    clear_env();
}

#[test]
fn invalid_thresholds_fail_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAPTURE_THR_QUALITY", "1.5");
    let err = EngineSettings::load().unwrap_err();
    assert!(err.to_string().contains("CAPTURE_INVALID_ARGUMENT"), "{}", err);

    clear_env();
    std::env::set_var("CAPTURE_MEMORY_LIMIT", "0");
    assert!(EngineSettings::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("CAPTURE_CONFIG", dir.path().join("absent.json"));
    let err = EngineSettings::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"), "{}", err);

    clear_env();
}
