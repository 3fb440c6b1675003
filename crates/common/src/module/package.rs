//! Package content and hashing
//!
//! A package is either a single file (loose module or archive) or a directory.
//! Files hash as their raw bytes. Directories hash as a canonical stream built
//! from every regular file below them, sorted by `/`-separated relative path:
//!
//! ```text
//! for each file: [ relative_path ][ 0x00 ][ len: u64 BE ][ bytes ]
//! ```
//!
//! Symlinks are skipped, never followed.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Read the exact bytes a package signature covers.
pub fn read_package(path: &Path) -> Result<Vec<u8>, std::io::Error> {
    if fs::metadata(path)?.is_dir() {
        read_directory(path)
    } else {
        fs::read(path)
    }
}

/// Lowercase hex SHA-256 of package content
pub fn hash_content(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn read_directory(root: &Path) -> Result<Vec<u8>, std::io::Error> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (relative, path) in files {
        let bytes = fs::read(&path)?;
        out.extend_from_slice(relative.as_bytes());
        out.push(0);
        out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), std::io::Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((relative, path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_content() {
        // SHA-256 of the empty string
        assert_eq!(
            hash_content(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_package_is_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin.py");
        fs::write(&path, b"print('hi')").unwrap();

        assert_eq!(read_package(&path).unwrap(), b"print('hi')");
    }

    #[test]
    fn test_directory_package_is_canonical() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("plugin");
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(pkg.join("main.py"), b"main").unwrap();
        fs::write(pkg.join("lib").join("util.py"), b"util").unwrap();

        let content = read_package(&pkg).unwrap();

        let mut expected = Vec::new();
        for (name, bytes) in [("lib/util.py", &b"util"[..]), ("main.py", &b"main"[..])] {
            expected.extend_from_slice(name.as_bytes());
            expected.push(0);
            expected.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            expected.extend_from_slice(bytes);
        }
        assert_eq!(content, expected);
    }

    #[test]
    fn test_directory_hash_tracks_content() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("plugin");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("main.py"), b"main").unwrap();
        let before = hash_content(&read_package(&pkg).unwrap());

        fs::write(pkg.join("extra.py"), b"").unwrap();
        let after = hash_content(&read_package(&pkg).unwrap());

        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_package_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_package(&dir.path().join("nope.zip")).is_err());
    }
}
