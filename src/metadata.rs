//! Title metadata reading
//!
//! The engine only cares about the [`MetadataReader`] contract: given a
//! candidate directory, produce a stable `(title_id, title_name)` pair or
//! signal "not a title". The shipped implementation parses the package's
//! `sce_sys/param.json` descriptor.

use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::models::TitleMeta;

/// Package metadata file, relative to the candidate directory.
pub const PARAM_JSON: &str = "sce_sys/param.json";

/// DRM type every sideloaded package must declare to launch.
const STANDARD_DRM: &str = "standard";

pub trait MetadataReader {
    /// Read the title identity from a candidate directory.
    ///
    /// `None` means "not a title": the caller skips the directory without
    /// caching it, so it is re-probed on every future cycle.
    fn read(&self, dir: &Path) -> Option<TitleMeta>;
}

/// Reads `sce_sys/param.json` descriptors.
pub struct ParamJsonReader;

impl MetadataReader for ParamJsonReader {
    fn read(&self, dir: &Path) -> Option<TitleMeta> {
        let param_path = dir.join(PARAM_JSON);

        // Packages dumped from disc media carry a non-standard DRM type
        // that blocks launching; rewrite it before the descriptor is used.
        if let Err(e) = normalize_drm_type(&param_path) {
            debug!(path = %param_path.display(), error = %e, "DRM normalization skipped");
        }

        let content = std::fs::read_to_string(&param_path).ok()?;
        let value: Value = serde_json::from_str(&content).ok()?;

        let title_id = extract_title_id(&value)?;
        let title_name = extract_title_name(&value).unwrap_or_else(|| title_id.clone());

        Some(TitleMeta::new(title_id, title_name))
    }
}

fn extract_title_id(value: &Value) -> Option<String> {
    ["titleId", "title_id"]
        .iter()
        .find_map(|key| value.get(key))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// The display name, preferring the `en-US` localized block.
fn extract_title_name(value: &Value) -> Option<String> {
    let localized = value
        .get("localizedParameters")
        .and_then(|l| l.get("en-US"))
        .and_then(|e| e.get("titleName"));

    localized
        .or_else(|| value.get("titleName"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Rewrite `applicationDrmType` to `"standard"` in place.
///
/// Returns whether the file was modified. Missing file or missing key is
/// not an error; the descriptor is simply left alone.
pub fn normalize_drm_type(param_path: &Path) -> anyhow::Result<bool> {
    let content = match std::fs::read_to_string(param_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let mut value: Value = serde_json::from_str(&content)?;
    let Some(drm) = value.get_mut("applicationDrmType") else {
        return Ok(false);
    };
    if drm.as_str() == Some(STANDARD_DRM) {
        return Ok(false);
    }

    *drm = Value::String(STANDARD_DRM.to_string());
    std::fs::write(param_path, serde_json::to_string_pretty(&value)?)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_param(dir: &Path, json: &str) {
        let sce_sys = dir.join("sce_sys");
        std::fs::create_dir_all(&sce_sys).unwrap();
        std::fs::write(sce_sys.join("param.json"), json).unwrap();
    }

    #[test]
    fn test_read_valid_package() {
        let temp = TempDir::new().unwrap();
        write_param(
            temp.path(),
            r#"{"titleId": "CUSA00001", "localizedParameters": {"en-US": {"titleName": "TestGame"}}}"#,
        );

        let meta = ParamJsonReader.read(temp.path()).unwrap();
        assert_eq!(meta.title_id, "CUSA00001");
        assert_eq!(meta.title_name, "TestGame");
    }

    #[test]
    fn test_read_snake_case_id_and_flat_name() {
        let temp = TempDir::new().unwrap();
        write_param(
            temp.path(),
            r#"{"title_id": "PPSA01234", "titleName": "OtherGame"}"#,
        );

        let meta = ParamJsonReader.read(temp.path()).unwrap();
        assert_eq!(meta.title_id, "PPSA01234");
        assert_eq!(meta.title_name, "OtherGame");
    }

    #[test]
    fn test_name_falls_back_to_id() {
        let temp = TempDir::new().unwrap();
        write_param(temp.path(), r#"{"titleId": "CUSA99999"}"#);

        let meta = ParamJsonReader.read(temp.path()).unwrap();
        assert_eq!(meta.title_name, "CUSA99999");
    }

    #[test]
    fn test_missing_param_is_not_a_title() {
        let temp = TempDir::new().unwrap();
        assert!(ParamJsonReader.read(temp.path()).is_none());
    }

    #[test]
    fn test_unparseable_param_is_not_a_title() {
        let temp = TempDir::new().unwrap();
        write_param(temp.path(), "{ not json");
        assert!(ParamJsonReader.read(temp.path()).is_none());
    }

    #[test]
    fn test_missing_title_id_is_not_a_title() {
        let temp = TempDir::new().unwrap();
        write_param(temp.path(), r#"{"titleName": "Nameless"}"#);
        assert!(ParamJsonReader.read(temp.path()).is_none());
    }

    #[test]
    fn test_drm_type_rewritten() {
        let temp = TempDir::new().unwrap();
        write_param(
            temp.path(),
            r#"{"titleId": "CUSA00001", "applicationDrmType": "disc"}"#,
        );
        let param = temp.path().join(PARAM_JSON);

        assert!(normalize_drm_type(&param).unwrap());

        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&param).unwrap()).unwrap();
        assert_eq!(value["applicationDrmType"], "standard");

        // Second pass is a no-op
        assert!(!normalize_drm_type(&param).unwrap());
    }

    #[test]
    fn test_drm_missing_key_untouched() {
        let temp = TempDir::new().unwrap();
        write_param(temp.path(), r#"{"titleId": "CUSA00001"}"#);
        let param = temp.path().join(PARAM_JSON);
        let before = std::fs::read_to_string(&param).unwrap();

        assert!(!normalize_drm_type(&param).unwrap());
        assert_eq!(std::fs::read_to_string(&param).unwrap(), before);
    }
}
