pub mod closure;

use serde::Serialize;
use std::path::Path;

/// Write `value` as JSON to a temp file beside `path`, then rename it into
/// place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> crate::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
