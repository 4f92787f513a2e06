use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::map::Map;
use crate::reader::MapReader;
use crate::variant::Variant;
use crate::writer::MapWriter;
use crate::{MapError, Result};

pub fn load_map(path: &Path, variant: Variant) -> Result<Map> {
    let data = fs::read(path)?;
    debug!("loaded {} ({} bytes) as {}", path.display(), data.len(), variant);
    MapReader::new(variant).read(&data)
}

/// Encodes `map` and swaps it into place via a sibling temporary file, so an
/// encode or write failure leaves any existing file untouched.
pub fn save_map(path: &Path, map: &Map, variant: Variant) -> Result<()> {
    let bytes = MapWriter::new(variant).write(map)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| MapError::Format(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, &bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    debug!("saved {} ({} bytes) as {}", path.display(), bytes.len(), variant);
    Ok(())
}

fn is_map_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("map"))
}

/// All `*.map` files under `root` (or `root` itself if it is a file),
/// sorted for stable output.
pub fn find_map_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| MapError::Io(e.into()))?;
        if entry.file_type().is_file() && is_map_file(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Sector, Wall};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("buildmap-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn save_then_load() {
        let dir = scratch_dir("save");
        let path = dir.join("E1M1.MAP");
        let mut map = Map::new();
        map.push_sector_loop(Sector::default(), &[(0, 0), (256, 0), (0, 256)], &Wall::default())
            .unwrap();

        save_map(&path, &map, Variant::Blood).unwrap();
        assert!(!dir.join("E1M1.MAP.tmp").exists());
        let back = load_map(&path, Variant::Blood).unwrap();
        assert_eq!(back.walls, map.walls);
        assert_eq!(back.sectors, map.sectors);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn finds_map_files_recursively() {
        let dir = scratch_dir("find");
        fs::create_dir_all(dir.join("episode1")).unwrap();
        fs::write(dir.join("a.map"), b"").unwrap();
        fs::write(dir.join("episode1").join("B.MAP"), b"").unwrap();
        fs::write(dir.join("episode1").join("readme.txt"), b"").unwrap();

        let found = find_map_files(&dir).unwrap();
        assert_eq!(found, vec![dir.join("a.map"), dir.join("episode1").join("B.MAP")]);
        assert_eq!(find_map_files(&dir.join("a.map")).unwrap(), vec![dir.join("a.map")]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
