pub mod document;
pub mod idrange;
pub mod patcher;

pub use document::{Element, load_document, parse_document, preset_flag, property_value,
    render_document, save_document, set_property};
pub use idrange::{IdAllocator, IdRange, USER_ID_BASE, promote};
pub use patcher::{CatalogMergeConfig, USER_ENTRY_PREFIX, merge_vehicle_catalogs,
    strip_preset_entries};
