use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Finds the device node of the first `<class_dir>/<prefix>*` entry whose
/// `<entry>/<name_file>` reads `name`, e.g. the Sense HAT framebuffer among
/// `/sys/class/graphics/fb*`.
pub fn find_device(
    class_dir: &Path,
    prefix: &str,
    name_file: &str,
    name: &str,
    dev_dir: &Path,
    what: &'static str,
) -> Result<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(class_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(prefix))
        .collect();
    entries.sort();
    entries
        .into_iter()
        .find(|entry| {
            fs::read_to_string(class_dir.join(entry).join(name_file))
                .map(|s| s.trim() == name)
                .unwrap_or(false)
        })
        .map(|entry| dev_dir.join(entry))
        .ok_or(Error::DeviceNotFound(what))
}
