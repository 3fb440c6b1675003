//! Shared test utilities for keystore integration tests
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use ::common::keystore::Keystore;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

/// Key size used where the test doesn't care; generation is much faster than 2048.
pub const TEST_KEY_SIZE: usize = 1024;

/// Route keystore logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a fresh keystore rooted in a temporary directory
pub fn setup_test_env() -> (Keystore, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let keystore = reopen(&temp_dir);
    (keystore, temp_dir)
}

/// Open a second, cache-cold keystore over the same files
pub fn reopen(temp_dir: &TempDir) -> Keystore {
    Keystore::open(
        temp_dir.path().join("keys"),
        temp_dir.path().join("master.key"),
    )
}

/// Write a zip package containing `entries` to `dir/file_name`
pub fn write_zip(dir: &Path, file_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();

    let path = dir.join(file_name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a loose single-file module and return its path
pub fn write_module(dir: &Path, file_name: &str, source: &[u8]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, source).unwrap();
    path
}

/// XOR one byte in the middle of a file, keeping its length
pub fn flip_middle_byte(path: &Path) {
    let mut bytes = std::fs::read(path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    std::fs::write(path, bytes).unwrap();
}
