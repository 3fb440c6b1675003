//! Integration tests for signing and verifying plugin packages

mod common;

use std::fs::OpenOptions;
use std::io::Write;

use ::common::module::{DigitalSignature, DEFAULT_VERSION};
use crate::common::TEST_KEY_SIZE;

#[test]
fn test_round_trip() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");

    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    assert!(keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_tampered_package_is_rejected() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");
    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();

    let mut file = OpenOptions::new().append(true).open(&pkg).unwrap();
    file.write_all(b"#").unwrap();
    drop(file);

    assert!(!keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_flipped_byte_is_rejected() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");
    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();

    common::flip_middle_byte(&pkg);

    assert!(!keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_wrong_key_is_rejected() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    keystore.keys().generate("vendorB", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");

    let mut signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    signature.signer_key_id = "vendorB".into();

    assert!(!keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_unknown_signer_is_rejected() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");

    let mut signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    signature.signer_key_id = "nobody".into();

    assert!(!keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_signing_is_not_deterministic() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");

    let first = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = keystore.signer().sign_module(&pkg, "vendorA").unwrap();

    assert_ne!(first.signature, second.signature);
    assert_eq!(first.file_hash, second.file_hash);
    for signature in [&first, &second] {
        assert!(keystore
            .signer()
            .verify_module_signature(&pkg, signature)
            .unwrap());
    }
}

#[test]
fn test_missing_manifest_defaults_version() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "loose.py", b"x = 1\n");

    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    assert_eq!(signature.version, DEFAULT_VERSION);
    assert_eq!(signature.module_name, "loose");
    assert!(keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}

#[test]
fn test_verify_in_a_fresh_process() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");
    let sig_path = temp.path().join("plugin.py.sig.json");
    keystore
        .signer()
        .sign_module(&pkg, "vendorA")
        .unwrap()
        .write_to(&sig_path)
        .unwrap();

    let signature = DigitalSignature::read_from(&sig_path).unwrap();
    let fresh = common::reopen(&temp);
    assert!(fresh.signer().verify_module_signature(&pkg, &signature).unwrap());
}

#[test]
fn test_verify_without_master_secret() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = common::write_module(temp.path(), "plugin.py", b"def run(): pass\n");
    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();

    let master_path = temp.path().join("master.key");
    std::fs::remove_file(&master_path).unwrap();

    let loader = common::reopen(&temp);
    assert!(loader
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
    assert!(!master_path.exists());
}

#[test]
fn test_directory_package() {
    let (keystore, temp) = common::setup_test_env();
    keystore.keys().generate("vendorA", TEST_KEY_SIZE).unwrap();
    let pkg = temp.path().join("pluginD");
    std::fs::create_dir_all(pkg.join("src")).unwrap();
    std::fs::write(
        pkg.join("manifest.json"),
        r#"{"name": "pluginD", "version": "0.3.0"}"#,
    )
    .unwrap();
    std::fs::write(pkg.join("src").join("main.py"), b"run()\n").unwrap();

    let signature = keystore.signer().sign_module(&pkg, "vendorA").unwrap();
    assert_eq!(signature.module_name, "pluginD");
    assert_eq!(signature.version, "0.3.0");
    assert!(keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());

    std::fs::write(pkg.join("src").join("main.py"), b"steal()\n").unwrap();
    assert!(!keystore
        .signer()
        .verify_module_signature(&pkg, &signature)
        .unwrap());
}
