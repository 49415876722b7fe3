//! Whole-pipeline runs over a crafted pre-upgrade workspace: detection,
//! phased migration, catalog work, legacy fix-up and final cleanup, plus the
//! idempotence guarantee for a second run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{Value, json};
use simdata_upgrade::catalog::CatalogMergeConfig;
use simdata_upgrade::{MigrationEntry, Phase, UpgradeConfig, UpgradeEngine};
use tempfile::tempdir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Relative path → file contents for every file under `root`, directories
/// included as entries with empty contents so an added or dropped directory
/// also breaks equality.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            if path.is_dir() {
                out.insert(format!("{rel}/"), Vec::new());
                stack.push(path);
            } else {
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    out
}

const VEHICLE_CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSCENARIO>
  <Catalog name="VehicleCatalog">
    <Vehicle name="factory_car">
      <Properties>
        <Property name="Preset" value="true"/>
        <Property name="SensorGroup" value="7"/>
      </Properties>
    </Vehicle>
    <Vehicle name="user_sedan">
      <Properties>
        <Property name="Preset" value="false"/>
        <Property name="SensorGroup" value="42"/>
        <Property name="Dynamic" value="3"/>
      </Properties>
    </Vehicle>
  </Catalog>
</OpenSCENARIO>
"#;

const SENSOR_CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SensorCatalog>
  <Catalog name="SensorGroupCatalog">
    <SensorGroup name="7"/>
    <SensorGroup name="42"/>
  </Catalog>
</SensorCatalog>
"#;

const SYS_VEHICLE_CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSCENARIO>
  <Catalog name="VehicleCatalog">
    <Vehicle name="factory_car">
      <Properties>
        <Property name="Preset" value="true"/>
        <Property name="SensorGroup" value="7"/>
      </Properties>
    </Vehicle>
    <Vehicle name="truck_02">
      <Properties>
        <Property name="Preset" value="true"/>
      </Properties>
    </Vehicle>
  </Catalog>
</OpenSCENARIO>
"#;

struct Workspace {
    root: PathBuf,
    app: PathBuf,
    _dir: tempfile::TempDir,
}

/// A flat pre-upgrade user tree plus a read-only vendor install.
fn legacy_workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let root = dir.path().join("userdata");
    let app = dir.path().join("app");

    write(
        &root.join("package.json"),
        &json!({ "name": "simdata", "version": "2.50.0", "language": "zh" }).to_string(),
    );
    write(&root.join("local.config"), "window=maximized");
    write(&root.join("scenario/my_scene.sim"), "user scene");
    write(&root.join("scenario/demo.sim"), "user-touched demo");
    write(
        &root.join("sensor_presets.json"),
        &json!([[{ "type": "camera", "name": "camera" }]]).to_string(),
    );
    write(&root.join("stray.sqlite"), "orphaned index");

    write(&app.join("preset/scenario/demo.sim"), "vendor demo");
    write(&app.join("catalogs/vehicle_catalog.xosc"), SYS_VEHICLE_CATALOG);
    write(&app.join("dynamics/.keep"), "");
    write(&app.join("models/.keep"), "");

    // The user catalogs as an older installer left them.
    write(&root.join("data/catalogs/vehicle_catalog.xosc"), VEHICLE_CATALOG);
    write(&root.join("data/catalogs/sensor_catalog.xosc"), SENSOR_CATALOG);
    write(&root.join("data/dynamics/dynamic_3.json"), "{\"m\":1500}");

    Workspace { root, app, _dir: dir }
}

fn engine_for(ws: &Workspace) -> UpgradeEngine {
    let root = &ws.root;
    let app = &ws.app;
    let config = UpgradeConfig::new(root, "simdata", "3.0.0")
        .entry(
            MigrationEntry::file(Phase::Cache, root.join("cache/recent_scenes.json"))
                .default_content("[]"),
        )
        .entry(
            MigrationEntry::file(Phase::System, root.join("sys/local.config"))
                .origin(root.join("local.config"))
                .should_delete(),
        )
        .entry(
            MigrationEntry::dir(Phase::UserData, root.join("data/scenario"))
                .origin(root.join("scenario"))
                .source(app.join("preset/scenario"))
                .only_user_data(),
        )
        .entry(
            MigrationEntry::file(Phase::UserData, root.join("data/sensor_presets.json"))
                .origin(root.join("sensor_presets.json")),
        )
        .entry(MigrationEntry::dir(Phase::Log, root.join("log")))
        .catalog_cleanup(root.join("data/catalogs/vehicle_catalog.xosc"))
        .catalog_merge(CatalogMergeConfig {
            user_vehicle_catalog: root.join("data/catalogs/vehicle_catalog.xosc"),
            user_sensor_catalog: root.join("data/catalogs/sensor_catalog.xosc"),
            sys_vehicle_catalog: app.join("catalogs/vehicle_catalog.xosc"),
            user_dynamics_dir: root.join("data/dynamics"),
            sys_dynamics_dir: app.join("dynamics"),
            sys_models_dir: app.join("models"),
            user_models_dir: root.join("data/models"),
        })
        .legacy_sensor_presets(root.join("data/sensor_presets.json"));
    UpgradeEngine::new(config).unwrap()
}

#[tokio::test]
async fn full_upgrade_of_a_legacy_workspace() -> Result<()> {
    let ws = legacy_workspace();
    let engine = engine_for(&ws);

    assert!(engine.needs_upgrade().await);
    let report = engine.run_migration().await;
    assert!(report.is_clean(), "{:?}", report.warnings);
    let report = engine.run_legacy_sensor_fix().await;
    assert!(report.is_clean(), "{:?}", report.warnings);

    let root = &ws.root;

    // Version record rewritten in place, language preserved.
    let record: Value = serde_json::from_str(&read(&root.join("sys/package.json")))?;
    assert_eq!(record["version"], "3.0.0");
    assert_eq!(record["language"], "zh");

    // System and cache entries.
    assert_eq!(read(&root.join("sys/local.config")), "window=maximized");
    assert_eq!(read(&root.join("cache/recent_scenes.json")), "[]");

    // User scenes: unique files carried, vendor-duplicated names not.
    assert_eq!(read(&root.join("data/scenario/my_scene.sim")), "user scene");
    assert!(!root.join("data/scenario/demo.sim").exists());

    // Catalog cleanup dropped the stale preset vehicle, then the merge
    // re-seeded the current vendor set (factory_car and the new truck_02,
    // each with a fresh preset-range id) and shifted the user sensor group
    // past the preset boundary.
    let catalog = read(&root.join("data/catalogs/vehicle_catalog.xosc"));
    assert!(catalog.contains("user_sedan"));
    assert!(catalog.contains("factory_car"));
    assert!(catalog.contains("truck_02"));
    assert!(catalog.contains("100042"));
    assert!(root.join("data/dynamics/dynamic_100003.json").exists());
    assert!(!root.join("data/dynamics/dynamic_3.json").exists());

    // Legacy sensor preset fix, applied after the file moved.
    let presets: Value = serde_json::from_str(&read(&root.join("data/sensor_presets.json")))?;
    assert_eq!(presets[0][0]["name"], "sensor.camera");

    // The flat layout is gone; only the namespaced tree remains.
    let mut top: Vec<String> = std::fs::read_dir(root)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    top.sort();
    assert_eq!(top, ["cache", "data", "log", "sys"]);

    // The vendor install is never written to.
    assert_eq!(read(&ws.app.join("preset/scenario/demo.sim")), "vendor demo");
    Ok(())
}

#[test]
fn cache_directory_is_guaranteed_before_the_async_engine_runs() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("userdata");
    let engine = UpgradeEngine::new(UpgradeConfig::new(&root, "simdata", "3.0.0")).unwrap();

    engine.ensure_cache_sync().unwrap();
    assert!(root.join("cache").is_dir());

    // Safe to call again; an existing directory is left alone.
    std::fs::write(root.join("cache/recent_scenes.json"), "[]").unwrap();
    engine.ensure_cache_sync().unwrap();
    assert_eq!(read(&root.join("cache/recent_scenes.json")), "[]");
}

#[tokio::test]
async fn second_launch_changes_nothing() {
    let ws = legacy_workspace();

    let engine = engine_for(&ws);
    assert!(engine.needs_upgrade().await);
    engine.run_migration().await;
    engine.run_legacy_sensor_fix().await;
    let after_first = snapshot(&ws.root);

    // A fresh engine, as a later application launch would build it: the
    // detection gate holds, the self-gated fix-up declines, and the tree
    // stays byte-identical.
    let engine = engine_for(&ws);
    assert!(!engine.needs_upgrade().await);
    let report = engine.run_legacy_sensor_fix().await;
    assert!(report.is_clean());

    assert_eq!(snapshot(&ws.root), after_first);
}

#[tokio::test]
async fn rerunning_the_migration_loses_no_user_data() {
    // Even when a caller re-runs the full pipeline on an already-migrated
    // tree, user files survive and nothing fails.
    let ws = legacy_workspace();
    let engine = engine_for(&ws);
    engine.run_migration().await;

    let engine = engine_for(&ws);
    let report = engine.run_migration().await;
    assert!(report.is_clean(), "{:?}", report.warnings);

    let root = &ws.root;
    assert_eq!(read(&root.join("data/scenario/my_scene.sim")), "user scene");
    assert_eq!(read(&root.join("sys/local.config")), "window=maximized");
    let catalog = read(&root.join("data/catalogs/vehicle_catalog.xosc"));
    assert!(catalog.contains("user_sedan"));
    assert!(catalog.contains("100042"));
}
