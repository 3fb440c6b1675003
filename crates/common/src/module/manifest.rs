use std::io::{Cursor, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manifest file looked up next to (or inside) a package
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "manifest.json";
/// Version recorded when no manifest declares one
pub const DEFAULT_VERSION: &str = "0.0.0";

const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Name and version bound into a module signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Default)]
struct PartialManifest {
    name: Option<String>,
    version: Option<String>,
}

/// Finds the manifest describing a package.
///
/// Where the manifest comes from depends on the package kind:
/// - directory: `<file_name>` inside it
/// - zip archive: the entry named `<file_name>` (shallowest first); a file
///   beside the archive is never consulted
/// - any other file: the package itself when it is a JSON manifest, else
///   `<file_name>` beside it
///
/// Missing fields fall back to the package stem and [`DEFAULT_VERSION`].
#[derive(Debug, Clone)]
pub(crate) struct ManifestResolver {
    file_name: String,
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_FILE_NAME)
    }
}

impl ManifestResolver {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Resolve manifest info for the package at `path` whose bytes are `content`.
    pub fn resolve(&self, path: &Path, content: &[u8]) -> ManifestInfo {
        let found = self.find(path, content).unwrap_or_default();

        let name = found.name.unwrap_or_else(|| {
            let stem = package_stem(path);
            tracing::warn!(
                "no module name in manifest for {}, using {}",
                path.display(),
                stem
            );
            stem
        });
        let version = found.version.unwrap_or_else(|| {
            tracing::warn!(
                "no module version in manifest for {}, defaulting to {}",
                path.display(),
                DEFAULT_VERSION
            );
            DEFAULT_VERSION.to_string()
        });

        ManifestInfo { name, version }
    }

    fn find(&self, path: &Path, content: &[u8]) -> Option<PartialManifest> {
        if path.is_dir() {
            return self.read_file(&path.join(&self.file_name));
        }
        match zip::ZipArchive::new(Cursor::new(content)) {
            Ok(archive) => self.archived(archive),
            // Loose module
            Err(_) => self.direct(path, content).or_else(|| self.sibling(path)),
        }
    }

    fn sibling(&self, path: &Path) -> Option<PartialManifest> {
        self.read_file(&path.parent()?.join(&self.file_name))
    }

    fn read_file(&self, candidate: &Path) -> Option<PartialManifest> {
        if !candidate.is_file() {
            return None;
        }
        match std::fs::read(candidate) {
            Ok(bytes) => parse_manifest(&bytes, &candidate.display().to_string()),
            Err(e) => {
                tracing::warn!("failed to read manifest {}: {}", candidate.display(), e);
                None
            }
        }
    }

    fn direct(&self, path: &Path, content: &[u8]) -> Option<PartialManifest> {
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let is_manifest = path.file_name().is_some_and(|n| n == self.file_name.as_str());
        if !(is_json || is_manifest) {
            return None;
        }
        parse_manifest(content, &path.display().to_string())
    }

    fn archived(&self, mut archive: zip::ZipArchive<Cursor<&[u8]>>) -> Option<PartialManifest> {
        let entry_name = archive
            .file_names()
            .filter(|name| name.rsplit('/').next() == Some(self.file_name.as_str()))
            .min_by_key(|name| (name.matches('/').count(), name.to_string()))?
            .to_string();

        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("failed to open archived manifest {}: {}", entry_name, e);
                return None;
            }
        };
        let mut bytes = Vec::new();
        if let Err(e) = entry
            .by_ref()
            .take(MAX_MANIFEST_SIZE)
            .read_to_end(&mut bytes)
        {
            tracing::warn!("failed to read archived manifest {}: {}", entry_name, e);
            return None;
        }
        parse_manifest(&bytes, &entry_name)
    }
}

fn parse_manifest(bytes: &[u8], origin: &str) -> Option<PartialManifest> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("ignoring unparseable manifest {}: {}", origin, e);
            return None;
        }
    };
    let Value::Object(fields) = value else {
        tracing::warn!("ignoring manifest {}: not a JSON object", origin);
        return None;
    };

    Some(PartialManifest {
        name: fields.get("name").and_then(scalar_string),
        version: fields.get("version").and_then(scalar_string),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// File stem for file packages, directory name for directories
fn package_stem(path: &Path) -> String {
    let stem = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    stem.map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn resolve(path: &Path) -> ManifestInfo {
        let content = crate::module::package::read_package(path).unwrap();
        ManifestResolver::default().resolve(path, &content)
    }

    #[test]
    fn test_manifest_beside_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{"name": "pluginX", "version": "1.2.0"}"#,
        )
        .unwrap();
        let pkg = dir.path().join("plugin.py");
        fs::write(&pkg, b"print('x')").unwrap();

        assert_eq!(
            resolve(&pkg),
            ManifestInfo {
                name: "pluginX".into(),
                version: "1.2.0".into()
            }
        );
    }

    #[test]
    fn test_manifest_inside_directory() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("plugin");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("manifest.json"), r#"{"name": "dirplug", "version": 3}"#).unwrap();

        let info = resolve(&pkg);
        assert_eq!(info.name, "dirplug");
        assert_eq!(info.version, "3");
    }

    #[test]
    fn test_manifest_passed_directly() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("plugin.json");
        fs::write(&pkg, r#"{"name": "solo", "version": "0.1.0"}"#).unwrap();

        assert_eq!(resolve(&pkg).name, "solo");
    }

    #[test]
    fn test_manifest_inside_zip() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("plugin.zip");
        let bytes = zip_with(&[
            ("pluginX/nested/manifest.json", &br#"{"name": "deep", "version": "9.9.9"}"#[..]),
            ("pluginX/manifest.json", &br#"{"name": "pluginX", "version": "1.2.0"}"#[..]),
            ("pluginX/main.py", &b"print('x')"[..]),
        ]);
        fs::write(&pkg, bytes).unwrap();

        let info = resolve(&pkg);
        assert_eq!(info.name, "pluginX");
        assert_eq!(info.version, "1.2.0");
    }

    #[test]
    fn test_sibling_ignored_for_zip() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{"name": "other", "version": "9.9.9"}"#,
        )
        .unwrap();
        let pkg = dir.path().join("plugin.zip");
        fs::write(
            &pkg,
            zip_with(&[("manifest.json", &br#"{"name": "pluginX", "version": "1.2.0"}"#[..])]),
        )
        .unwrap();
        assert_eq!(resolve(&pkg).name, "pluginX");

        // An archive without a manifest still does not borrow its neighbour's
        let bare = dir.path().join("bare.zip");
        fs::write(&bare, zip_with(&[("main.py", &b"run()"[..])])).unwrap();
        assert_eq!(
            resolve(&bare),
            ManifestInfo {
                name: "bare".into(),
                version: DEFAULT_VERSION.into()
            }
        );
    }

    #[test]
    fn test_missing_manifest_defaults() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("loose_module.py");
        fs::write(&pkg, b"print('x')").unwrap();

        assert_eq!(
            resolve(&pkg),
            ManifestInfo {
                name: "loose_module".into(),
                version: DEFAULT_VERSION.into()
            }
        );
    }

    #[test]
    fn test_unparseable_manifest_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.json"), b"{not json").unwrap();
        let pkg = dir.path().join("plugin.zip");
        fs::write(
            &pkg,
            zip_with(&[("manifest.json", &br#"{"name": "zipped", "version": "2.0.0"}"#[..])]),
        )
        .unwrap();

        let info = resolve(&pkg);
        assert_eq!(info.name, "zipped");
        assert_eq!(info.version, "2.0.0");
    }

    #[test]
    fn test_custom_manifest_file_name() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("plugin.meta.json"),
            r#"{"name": "custom", "version": "4.0.0"}"#,
        )
        .unwrap();
        let pkg = dir.path().join("plugin.bin");
        fs::write(&pkg, b"\x00\x01").unwrap();

        let info = ManifestResolver::new("plugin.meta.json").resolve(&pkg, b"\x00\x01");
        assert_eq!(info.name, "custom");
        assert_eq!(info.version, "4.0.0");
    }
}
