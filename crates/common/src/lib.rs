/**
 * Cryptographic types and operations.
 *  - Master secret persistence and key derivation
 *  - Private key envelope encoding (current + legacy)
 *  - RSA-PSS signing and verification
 */
pub mod crypto;
/**
 * File-backed keystore: generation, persistence,
 *  caching and loading of key pairs, plus the
 *  `Keystore` facade that wires every component.
 */
pub mod keystore;
/**
 * Plugin package signing. Resolves manifest
 *  metadata, hashes package content and produces
 *  self-contained signature records.
 */
pub mod module;

pub mod prelude {
    pub use crate::crypto::{KeyPair, SignatureEngine};
    pub use crate::keystore::{KeyPairManager, Keystore, KeystoreError};
    pub use crate::module::{DigitalSignature, ManifestInfo, ModuleError, ModuleSigner};
}
