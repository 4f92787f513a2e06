use buildmap_core::{MapError, Variant};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_variant: Variant,
    pub log_level: String,
    pub verify_checksum: bool,
    pub pretty_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_variant: Variant::Duke3d,
            log_level: "info".to_string(),
            verify_checksum: true,
            pretty_json: true,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut base = dirs::config_dir().or_else(dirs::data_dir)?;
    base.push("buildmap");
    base.push("settings.json");
    Some(base)
}

/// Settings from `explicit` if given (errors are reported), otherwise from
/// the per-user config file when it exists and parses, otherwise defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, MapError> {
    if let Some(path) = explicit {
        let data = fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&data)?);
    }

    if let Some(path) = default_config_path() {
        if let Ok(data) = fs::read_to_string(&path) {
            if let Ok(settings) = serde_json::from_str::<Settings>(&data) {
                return Ok(settings);
            }
        }
    }
    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_per_field() {
        let settings: Settings =
            serde_json::from_str(r#"{ "default_variant": "blood", "pretty_json": false }"#).unwrap();
        assert_eq!(settings.default_variant, Variant::Blood);
        assert!(!settings.pretty_json);
        assert!(settings.verify_checksum);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn explicit_path_errors_are_reported() {
        let path = std::env::temp_dir().join(format!("buildmap-settings-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(MapError::Json(_))));
        fs::remove_file(&path).unwrap();

        assert!(matches!(load_settings(Some(&path)), Err(MapError::Io(_))));
    }
}
