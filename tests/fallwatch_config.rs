use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use fallwatch::config::FallwatchConfig;
use fallwatch::{FrameBounds, StoreKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALLWATCH_CONFIG",
        "FALLWATCH_SOURCE",
        "FALLWATCH_FRAME_LIMIT",
        "FALLWATCH_PIPELINE",
        "FALLWATCH_TEMPLATE_STORE",
        "FALLWATCH_TEMPLATE_PATH",
        "FALLWATCH_K",
        "FALLWATCH_FALL_THRESHOLD",
        "FALLWATCH_OVERLAY_DIR",
        "FALLWATCH_CAPTURE_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FallwatchConfig::load().expect("load config");
    assert_eq!(cfg.source.uri, "stub://fall");
    assert_eq!(cfg.source.frame_limit, None);
    assert_eq!(cfg.pipeline, "cpu");
    assert_eq!(cfg.templates.store, StoreKind::Sqlite);
    assert_eq!(cfg.templates.path, PathBuf::from("templates.db"));
    assert_eq!(cfg.k, 20);
    assert_eq!(cfg.session.box_window, 5);
    assert_eq!(cfg.session.classification_window, 5);
    assert_eq!(cfg.session.fall_frame_threshold, 3);
    assert!(cfg.session.classify);
    assert_eq!(cfg.session.bounds, FrameBounds::new(640, 480));
    assert!(cfg.overlay_dir.is_none() && cfg.capture_dir.is_none());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        pipeline = "scripted"

        [source]
        uri = "/var/lib/fallwatch/frames"
        frame_limit = 300
        width = 320
        height = 240

        [templates]
        store = "filesystem"
        path = "/var/lib/fallwatch/templates"

        [classifier]
        k = 9

        [session]
        box_window = 7
        fall_frame_threshold = 5
        classify = false

        [output]
        overlay_dir = "/tmp/overlays"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("FALLWATCH_CONFIG", file.path());
    std::env::set_var("FALLWATCH_K", "11");
    std::env::set_var("FALLWATCH_TEMPLATE_STORE", "memory");
    std::env::set_var("FALLWATCH_CAPTURE_DIR", "/tmp/captures");

    let cfg = FallwatchConfig::load().expect("load config");
    assert_eq!(cfg.pipeline, "scripted");
    assert_eq!(cfg.source.uri, "/var/lib/fallwatch/frames");
    assert_eq!(cfg.source.frame_limit, Some(300));
    assert_eq!(cfg.session.bounds, FrameBounds::new(320, 240));
    assert_eq!(cfg.templates.store, StoreKind::Memory);
    assert_eq!(cfg.templates.path, PathBuf::from("/var/lib/fallwatch/templates"));
    assert_eq!(cfg.k, 11);
    assert_eq!(cfg.session.box_window, 7);
    assert_eq!(cfg.session.classification_window, 5);
    assert_eq!(cfg.session.fall_frame_threshold, 5);
    assert!(!cfg.session.classify);
    assert_eq!(cfg.overlay_dir, Some(PathBuf::from("/tmp/overlays")));
    assert_eq!(cfg.capture_dir, Some(PathBuf::from("/tmp/captures")));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FALLWATCH_K", "0");
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_K", "many");
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_PIPELINE", "gpu");
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[session]\nbox_window = 0\n").expect("write config");
    std::env::set_var("FALLWATCH_CONFIG", file.path());
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[session]\nunknown_key = 1\n").expect("write config");
    std::env::set_var("FALLWATCH_CONFIG", file.path());
    assert!(FallwatchConfig::load().is_err());
    clear_env();
}
