use std::path::Path;

use simdata_upgrade::{CompareOp, UpgradeConfig, UpgradeEngine, VersionRecord};
use tempfile::tempdir;

fn make_engine(root: &Path, version: &str) -> UpgradeEngine {
    UpgradeEngine::new(UpgradeConfig::new(root, "simdata", version)).unwrap()
}

fn write_record(path: &Path, version: &str, language: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let record = VersionRecord {
        name: "simdata".to_string(),
        version: version.to_string(),
        language: language.to_string(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&record).unwrap()).unwrap();
}

fn read_record(path: &Path) -> VersionRecord {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn blank_workspace_needs_upgrade_then_settles() {
    // Scenario C.
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), "3.0.0");
    assert!(engine.needs_upgrade().await);
    engine.run_migration().await;

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(!engine.needs_upgrade().await);
    let record = read_record(&dir.path().join("sys/package.json"));
    assert_eq!(record.version, "3.0.0");
}

#[tokio::test]
async fn older_record_triggers_upgrade_and_preserves_language() {
    let dir = tempdir().unwrap();
    write_record(&dir.path().join("sys/package.json"), "2.40.0", "zh-CN");

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(engine.needs_upgrade().await);

    let record = read_record(&dir.path().join("sys/package.json"));
    assert_eq!(record.version, "3.0.0");
    assert_eq!(record.language, "zh-CN");
}

#[tokio::test]
async fn current_record_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sys/package.json");
    write_record(&path, "3.0.0", "en");
    let before = std::fs::read(&path).unwrap();

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(!engine.needs_upgrade().await);
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn corrupt_record_counts_as_missing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sys/package.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(engine.needs_upgrade().await);
    // A corrupt record must never qualify for legacy fix-ups.
    assert!(
        !engine
            .oracle()
            .compare_install_version("2.55.9999", CompareOp::Le)
            .await
    );
}

#[tokio::test]
async fn legacy_top_level_record_is_read_first() {
    let dir = tempdir().unwrap();
    write_record(&dir.path().join("package.json"), "2.50.0", "en");
    write_record(&dir.path().join("sys/package.json"), "3.0.0", "en");

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(engine.needs_upgrade().await);
    assert!(
        engine
            .oracle()
            .compare_install_version("2.55.9999", CompareOp::Le)
            .await
    );
    // The rewrite goes to the namespaced location only.
    let legacy = read_record(&dir.path().join("package.json"));
    assert_eq!(legacy.version, "2.50.0");
}

#[tokio::test]
async fn compare_uses_the_version_installed_before_the_rewrite() {
    let dir = tempdir().unwrap();
    write_record(&dir.path().join("sys/package.json"), "2.40.0", "en");

    let engine = make_engine(dir.path(), "3.0.0");
    assert!(engine.needs_upgrade().await);
    // The record on disk now says 3.0.0, but the legacy gate still has to
    // see the pre-upgrade version within this process.
    assert!(
        engine
            .oracle()
            .compare_install_version("2.55.9999", CompareOp::Le)
            .await
    );
}

#[tokio::test]
async fn compare_install_version_operators() {
    // Scenario E: no record at all compares as false for every operator.
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), "3.0.0");
    assert!(
        !engine
            .oracle()
            .compare_install_version("2.55.9999", CompareOp::Le)
            .await
    );

    write_record(&dir.path().join("sys/package.json"), "2.55.9999", "en");
    let engine = make_engine(dir.path(), "3.0.0");
    let oracle = engine.oracle();
    assert!(oracle.compare_install_version("2.55.9999", CompareOp::Le).await);
    assert!(oracle.compare_install_version("2.55.9999", CompareOp::Eq).await);
    assert!(!oracle.compare_install_version("2.55.9999", CompareOp::Lt).await);
    assert!(oracle.compare_install_version("2.56.0", CompareOp::Lt).await);
    assert!(oracle.compare_install_version("2.55.0", CompareOp::Gt).await);
    assert!(!oracle.compare_install_version("not-a-version", CompareOp::Le).await);
}
