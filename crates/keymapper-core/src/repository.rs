// Keymapper Repository
// Key maps stored as [[keymap]] tables in a TOML file

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::RwLock;
use thiserror::Error;

use crate::keymap::KeyMap;
use crate::record::{self, RecordError};

/// Errors that can occur when loading or saving key maps
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("No source path set")]
    NoSourcePath,

    #[error("Key map not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Key maps keyed by uid, in insertion order.
///
/// Reads and writes go through a lock so a reload can run on another
/// thread than the input loop.
#[derive(Debug, Default)]
pub struct KeyMapRepository {
    keymaps: RwLock<IndexMap<String, KeyMap>>,
    path: Option<PathBuf>,
}

impl KeyMapRepository {
    /// Create an empty in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a repository file. A missing file is an empty repository.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repository = Self {
            keymaps: RwLock::new(IndexMap::new()),
            path: Some(path.as_ref().to_path_buf()),
        };

        if path.as_ref().exists() {
            repository.reload()?;
        }
        Ok(repository)
    }

    /// Default repository location (~/.config/keymapper/keymaps.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keymapper").join("keymaps.toml"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the contents with what is on disk.
    pub fn reload(&self) -> Result<usize> {
        let path = self.path.as_ref().ok_or(RepositoryError::NoSourcePath)?;
        let content = std::fs::read_to_string(path)?;
        let loaded = record::decode_keymaps(&content)?;
        let count = loaded.len();

        let mut keymaps = self.keymaps.write();
        keymaps.clear();
        for keymap in loaded {
            keymaps.insert(keymap.uid.clone(), keymap);
        }

        info!("Loaded {} key maps from {}", count, path.display());
        Ok(count)
    }

    /// Write every key map to the source file.
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or(RepositoryError::NoSourcePath)?;
        self.save_to(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = {
            let keymaps = self.keymaps.read();
            record::encode_keymaps(keymaps.values())?
        };

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, content)?;
        debug!("Saved key maps to {}", path.as_ref().display());
        Ok(())
    }

    /// Insert or replace a key map. New key maps get the next free id.
    pub fn insert(&self, mut keymap: KeyMap) -> KeyMap {
        let mut keymaps = self.keymaps.write();

        if keymap.id == 0 {
            let existing = keymaps.get(&keymap.uid).map(|stored| stored.id);
            keymap.id = existing.unwrap_or_else(|| {
                keymaps.values().map(|stored| stored.id).max().unwrap_or(0) + 1
            });
        }

        keymaps.insert(keymap.uid.clone(), keymap.clone());
        keymap
    }

    /// Replace an existing key map.
    pub fn update(&self, keymap: KeyMap) -> Result<()> {
        let mut keymaps = self.keymaps.write();
        match keymaps.get_mut(&keymap.uid) {
            Some(stored) => {
                *stored = keymap;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(keymap.uid)),
        }
    }

    pub fn remove(&self, uid: &str) -> Option<KeyMap> {
        self.keymaps.write().shift_remove(uid)
    }

    pub fn get(&self, uid: &str) -> Option<KeyMap> {
        self.keymaps.read().get(uid).cloned()
    }

    /// Snapshot of every key map
    pub fn all(&self) -> Vec<KeyMap> {
        self.keymaps.read().values().cloned().collect()
    }

    /// Key maps the detection engine should listen for
    pub fn enabled(&self) -> Vec<KeyMap> {
        self.keymaps
            .read()
            .values()
            .filter(|keymap| keymap.enabled && keymap.is_valid())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keymaps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keymaps.read().is_empty()
    }
}
