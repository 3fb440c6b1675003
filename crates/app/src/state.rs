use std::{fs, path::PathBuf};

use common::crypto::{MasterSecretError, MasterSecretStore, DEFAULT_KEY_SIZE};
use common::keystore::Keystore;
use common::module::DEFAULT_MANIFEST_FILE_NAME;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "modseal";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const MASTER_KEY_FILE_NAME: &str = "master.key";
pub const KEYS_DIR_NAME: &str = "keys";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// RSA modulus size for `key generate` when no size is given
    #[serde(default = "default_key_size")]
    pub default_key_size: usize,
    /// Manifest file looked up beside or inside packages
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,
}

fn default_key_size() -> usize {
    DEFAULT_KEY_SIZE
}

fn default_manifest_file_name() -> String {
    DEFAULT_MANIFEST_FILE_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_key_size: default_key_size(),
            manifest_file_name: default_manifest_file_name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the modseal directory (~/.modseal)
    pub modseal_dir: PathBuf,
    /// Directory holding `{key_id}.private|public|meta`
    pub keys_path: PathBuf,
    /// Path to the master secret
    pub master_key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the modseal directory path (custom or default ~/.modseal)
    pub fn modseal_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new modseal directory, including its master secret
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let modseal_dir = Self::modseal_dir(custom_path)?;
        let config_path = modseal_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let keys_path = modseal_dir.join(KEYS_DIR_NAME);
        fs::create_dir_all(&keys_path)?;

        // An existing master secret is kept; keys encrypted under it stay readable
        let master_key_path = modseal_dir.join(MASTER_KEY_FILE_NAME);
        MasterSecretStore::new(&master_key_path).get_or_create()?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        tracing::info!("initialized modseal directory at {}", modseal_dir.display());

        Ok(Self {
            modseal_dir,
            keys_path,
            master_key_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the modseal directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let modseal_dir = Self::modseal_dir(custom_path)?;

        if !modseal_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let keys_path = modseal_dir.join(KEYS_DIR_NAME);
        let master_key_path = modseal_dir.join(MASTER_KEY_FILE_NAME);
        let config_path = modseal_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !master_key_path.exists() {
            return Err(StateError::MissingFile(MASTER_KEY_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            modseal_dir,
            keys_path,
            master_key_path,
            config_path,
            config,
        })
    }

    /// Open the keystore described by this state
    pub fn keystore(&self) -> Keystore {
        Keystore::open(&self.keys_path, &self.master_key_path)
            .with_manifest_file_name(self.config.manifest_file_name.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("modseal directory not initialized. Run 'modseal init' first")]
    NotInitialized,

    #[error("modseal directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("master secret error: {0}")]
    MasterSecret(#[from] MasterSecretError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("modseal");

        let config = AppConfig {
            default_key_size: 3072,
            manifest_file_name: "plugin.json".to_string(),
        };
        let state = AppState::init(Some(dir.clone()), Some(config.clone())).unwrap();
        assert!(state.keys_path.is_dir());
        assert!(state.master_key_path.is_file());

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.master_key_path, state.master_key_path);
    }

    #[test]
    fn test_init_twice() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("modseal");

        AppState::init(Some(dir.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_init_keeps_existing_master_secret() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("modseal");
        let master = MasterSecretStore::new(dir.join(MASTER_KEY_FILE_NAME));
        let before = master.get_or_create().unwrap();

        AppState::init(Some(dir.clone()), None).unwrap();

        let after = MasterSecretStore::new(dir.join(MASTER_KEY_FILE_NAME))
            .get_or_create()
            .unwrap();
        assert_eq!(before.bytes(), after.bytes());
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_key_size, DEFAULT_KEY_SIZE);
        assert_eq!(config.manifest_file_name, "manifest.json");
    }
}
