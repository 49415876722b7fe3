//! Catalog reconciliation: purging stale preset entries, remapping
//! sensor-group and dynamics identifiers into the user id range, and merging
//! newly shipped vendor vehicles into the user's catalog.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::document::{
    Element, load_document, preset_flag, property_value, save_document, set_property,
};
use crate::catalog::idrange::{IdAllocator, IdRange, promote};
use crate::core::{MigrationReport, MigrationWarning, Result, UpgradeError, fsx};
use crate::policy::Phase;

const SENSOR_GROUP_PROP: &str = "SensorGroup";
const DYNAMIC_PROP: &str = "Dynamic";
const MODEL_PROP: &str = "model3d";

/// Names of user-authored entries in documents that predate the Preset flag.
pub const USER_ENTRY_PREFIX: &str = "user_";

/// Paths consumed by the catalog-merge phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMergeConfig {
    pub user_vehicle_catalog: PathBuf,
    pub user_sensor_catalog: PathBuf,
    pub sys_vehicle_catalog: PathBuf,
    pub user_dynamics_dir: PathBuf,
    pub sys_dynamics_dir: PathBuf,
    pub sys_models_dir: PathBuf,
    pub user_models_dir: PathBuf,
}

fn dynamics_file(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("dynamic_{id}.json"))
}

fn entry_tag_for(catalog_kind: &str) -> Option<&'static str> {
    match catalog_kind {
        "VehicleCatalog" => Some("Vehicle"),
        "MiscObjectCatalog" => Some("MiscObject"),
        "PedestrianCatalog" => Some("Pedestrian"),
        _ => None,
    }
}

/// Removes vendor-owned entries from a user catalog document.
///
/// Entries flagged `Preset=true` always go; entries without the flag are
/// legacy and kept only when their name carries the user prefix, unless they
/// are the document's lone entry. The document is rewritten only if at least
/// one entry was removed. Returns whether a rewrite happened.
pub async fn strip_preset_entries(path: &Path) -> Result<bool> {
    let mut doc = load_document(path).await?;
    let catalog = doc.first_child_mut("Catalog").ok_or_else(|| {
        UpgradeError::CatalogShape(format!("'{}' has no Catalog element", path.display()))
    })?;
    let kind = catalog.attr("name").unwrap_or_default().to_string();
    let entry_tag = entry_tag_for(&kind)
        .ok_or_else(|| UpgradeError::CatalogShape(format!("unknown catalog kind '{kind}'")))?;

    let lone_entry = catalog.children_named(entry_tag).count() == 1;
    let before = catalog.children.len();
    catalog.children.retain(|child| {
        if child.tag != entry_tag {
            return true;
        }
        match preset_flag(child) {
            Some(true) => false,
            Some(false) => true,
            None if lone_entry => true,
            None => child
                .attr("name")
                .is_some_and(|name| name.starts_with(USER_ENTRY_PREFIX)),
        }
    });
    let changed = catalog.children.len() != before;
    if changed {
        save_document(path, &doc).await?;
    }
    Ok(changed)
}

/// Runs the full catalog-merge step: remap user ids, merge vendor vehicles,
/// verify id uniqueness and copy referenced model directories.
///
/// The two user documents are rewritten only if a mutation occurred, so an
/// already-migrated workspace comes out byte-identical.
pub async fn merge_vehicle_catalogs(
    cfg: &CatalogMergeConfig,
    report: &mut MigrationReport,
) -> Result<()> {
    let mut user_doc = load_document(&cfg.user_vehicle_catalog).await?;
    let mut sensor_doc = load_document(&cfg.user_sensor_catalog).await?;
    let sys_doc = load_document(&cfg.sys_vehicle_catalog).await?;

    let existing_group_ids: Vec<u64> = sensor_doc
        .first_child("Catalog")
        .map(|catalog| {
            catalog
                .children_named("SensorGroup")
                .filter_map(|g| g.attr("name").and_then(|n| n.parse().ok()))
                .collect()
        })
        .unwrap_or_default();
    let mut alloc = IdAllocator::new(existing_group_ids);

    let mut changed = false;
    {
        let groups = sensor_doc.first_child_mut("Catalog").ok_or_else(|| {
            UpgradeError::CatalogShape(format!(
                "'{}' has no Catalog element",
                cfg.user_sensor_catalog.display()
            ))
        })?;

        for catalog in user_doc.children_named_mut("Catalog") {
            changed |=
                remap_user_vehicles(catalog, groups, &mut alloc, &cfg.user_dynamics_dir, report)
                    .await?;
        }

        // Vendor sub-catalogs pair with user sub-catalogs by position
        // (ego first, combination/truck second).
        let sys_catalogs: Vec<&Element> = sys_doc.children_named("Catalog").collect();
        for (idx, user_catalog) in user_doc.children_named_mut("Catalog").enumerate() {
            if let Some(sys_catalog) = sys_catalogs.get(idx) {
                changed |=
                    merge_vendor_entries(user_catalog, sys_catalog, groups, &mut alloc, cfg, report)
                        .await?;
            }
        }
    }

    if changed {
        save_document(&cfg.user_vehicle_catalog, &user_doc).await?;
        save_document(&cfg.user_sensor_catalog, &sensor_doc).await?;
    }

    check_sensor_group_uniqueness(&user_doc, report);
    copy_model_dirs(cfg, &user_doc, report).await;
    Ok(())
}

/// Shifts user-owned preset-range ids into the user range and allocates ids
/// for vehicles that have none, keeping the sensor-group list and the
/// dynamics side-files in lock-step.
async fn remap_user_vehicles(
    catalog: &mut Element,
    groups: &mut Element,
    alloc: &mut IdAllocator,
    dynamics_dir: &Path,
    report: &mut MigrationReport,
) -> Result<bool> {
    let mut changed = false;
    for vehicle in catalog.children_named_mut("Vehicle") {
        let vehicle_name = vehicle.attr("name").unwrap_or_default().to_string();
        let user_owned = preset_flag(vehicle) == Some(false);

        let sensor_group = property_value(vehicle, SENSOR_GROUP_PROP).map(str::to_string);
        match sensor_group.as_deref().map(|v| v.parse::<u64>()) {
            Some(Ok(id)) if user_owned && IdRange::Preset.contains(id) => {
                let new_id = promote(id);
                set_property(vehicle, SENSOR_GROUP_PROP, &new_id.to_string());
                relocate_group(groups, id, new_id);
                alloc.mark(new_id);
                changed = true;
            }
            Some(Ok(id)) => alloc.mark(id),
            // Non-numeric value, leave untouched.
            Some(Err(_)) => {}
            None => {
                let id = alloc.allocate(IdRange::User);
                set_property(vehicle, SENSOR_GROUP_PROP, &id.to_string());
                groups.push_child(Element::new("SensorGroup").with_attr("name", id.to_string()));
                changed = true;
            }
        }

        let dynamic = property_value(vehicle, DYNAMIC_PROP)
            .map(str::to_string)
            .filter(|v| !v.is_empty());
        if let Some(Ok(id)) = dynamic.map(|v| v.parse::<u64>()) {
            let side_file = dynamics_file(dynamics_dir, id);
            if fsx::path_exists(&side_file).await {
                if user_owned && IdRange::Preset.contains(id) {
                    let new_id = promote(id);
                    match fsx::rename(&side_file, &dynamics_file(dynamics_dir, new_id)).await {
                        Ok(()) => {
                            set_property(vehicle, DYNAMIC_PROP, &new_id.to_string());
                            changed = true;
                        }
                        Err(err) => report.push(MigrationWarning::EntryFailed {
                            phase: Phase::CatalogMerge,
                            target: side_file,
                            detail: err.to_string(),
                        }),
                    }
                }
            } else {
                report.push(MigrationWarning::MissingDynamicsFile {
                    vehicle: vehicle_name,
                    id,
                });
            }
        }
    }
    Ok(changed)
}

fn relocate_group(groups: &mut Element, old_id: u64, new_id: u64) {
    let found = groups
        .children_named_mut("SensorGroup")
        .find(|g| g.attr("name").and_then(|n| n.parse::<u64>().ok()) == Some(old_id));
    match found {
        Some(group) => group.set_attr("name", new_id.to_string()),
        None => groups.push_child(Element::new("SensorGroup").with_attr("name", new_id.to_string())),
    }
}

/// Appends vendor vehicles the user does not have yet, with a freshly
/// allocated sensor-group id (preset-range when the vehicle is flagged
/// preset, user-range otherwise) and their dynamics side-file if any.
async fn merge_vendor_entries(
    user_catalog: &mut Element,
    sys_catalog: &Element,
    groups: &mut Element,
    alloc: &mut IdAllocator,
    cfg: &CatalogMergeConfig,
    report: &mut MigrationReport,
) -> Result<bool> {
    let existing: HashSet<String> = user_catalog
        .children_named("Vehicle")
        .filter_map(|v| v.attr("name"))
        .map(str::to_string)
        .collect();

    let mut changed = false;
    for vendor in sys_catalog.children_named("Vehicle") {
        let Some(name) = vendor.attr("name") else {
            continue;
        };
        if existing.contains(name) {
            continue;
        }

        let mut vehicle = vendor.clone();
        let range = if preset_flag(&vehicle) == Some(true) {
            IdRange::Preset
        } else {
            IdRange::User
        };
        let id = alloc.allocate(range);
        set_property(&mut vehicle, SENSOR_GROUP_PROP, &id.to_string());
        groups.push_child(Element::new("SensorGroup").with_attr("name", id.to_string()));

        let dynamic = property_value(&vehicle, DYNAMIC_PROP)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(dyn_id) = dynamic {
            let vendor_file = dynamics_file(&cfg.sys_dynamics_dir, dyn_id);
            if fsx::path_exists(&vendor_file).await {
                let user_file = dynamics_file(&cfg.user_dynamics_dir, dyn_id);
                if !fsx::path_exists(&user_file).await {
                    if let Err(err) = fsx::copy_file(&vendor_file, &user_file).await {
                        report.push(MigrationWarning::EntryFailed {
                            phase: Phase::CatalogMerge,
                            target: user_file,
                            detail: err.to_string(),
                        });
                    }
                }
            } else {
                report.push(MigrationWarning::MissingDynamicsFile {
                    vehicle: name.to_string(),
                    id: dyn_id,
                });
            }
        }

        user_catalog.push_child(vehicle);
        changed = true;
    }
    Ok(changed)
}

/// Post-merge integrity pass: no two vehicles may share a sensor-group id.
fn check_sensor_group_uniqueness(user_doc: &Element, report: &mut MigrationReport) {
    let mut by_id: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for catalog in user_doc.children_named("Catalog") {
        for vehicle in catalog.children_named("Vehicle") {
            if let Some(id) =
                property_value(vehicle, SENSOR_GROUP_PROP).and_then(|v| v.parse().ok())
            {
                by_id
                    .entry(id)
                    .or_default()
                    .push(vehicle.attr("name").unwrap_or_default().to_string());
            }
        }
    }
    for (id, vehicles) in by_id {
        if vehicles.len() > 1 {
            report.push(MigrationWarning::SensorGroupCollision { id, vehicles });
        }
    }
}

/// Copies every 3D-model directory referenced by a user vehicle from the
/// vendor asset tree, once, skipping directories already present.
async fn copy_model_dirs(
    cfg: &CatalogMergeConfig,
    user_doc: &Element,
    report: &mut MigrationReport,
) {
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for catalog in user_doc.children_named("Catalog") {
        for vehicle in catalog.children_named("Vehicle") {
            let model = property_value(vehicle, MODEL_PROP).or_else(|| vehicle.attr(MODEL_PROP));
            if let Some(model) = model {
                if let Some(first) = model.split('/').next().filter(|s| !s.is_empty()) {
                    dirs.insert(first.to_string());
                }
            }
        }
    }

    for dir in dirs {
        let source = cfg.sys_models_dir.join(&dir);
        let target = cfg.user_models_dir.join(&dir);
        if !fsx::path_exists(&target).await && fsx::path_exists(&source).await {
            if let Err(err) = fsx::copy_recursive(&source, &target).await {
                report.push(MigrationWarning::EntryFailed {
                    phase: Phase::CatalogMerge,
                    target,
                    detail: err.to_string(),
                });
            }
        }
    }
}
