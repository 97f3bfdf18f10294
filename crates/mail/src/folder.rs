//! Folder configuration and resolution
//!
//! The user picks one provider label whose messages are treated as
//! newsletters. The choice lives in a small JSON file and is cached in
//! memory once read.

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::MailError;
use crate::models::{Label, LabelId};

/// Folder used when none has been configured
pub const DEFAULT_FOLDER_NAME: &str = "Da guardare";

/// Persisted folder choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    pub folder_name: String,
}

/// File-backed folder setting with an in-process cache
pub struct FolderSettings {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FolderSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    /// The configured folder name, or [`DEFAULT_FOLDER_NAME`]
    pub fn folder_name(&self) -> String {
        if let Some(name) = self
            .cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return name.clone();
        }

        let name = self.load().unwrap_or_else(|| DEFAULT_FOLDER_NAME.to_string());
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(name.clone());
        name
    }

    /// Current configuration as exposed to callers
    pub fn config(&self) -> FolderConfig {
        FolderConfig {
            folder_name: self.folder_name(),
        }
    }

    /// Persist a new folder name
    ///
    /// Blank names are rejected with [`MailError::InvalidArgument`].
    pub fn set_folder_name(&self, name: &str) -> Result<FolderConfig> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MailError::invalid("folder_name must not be empty").into());
        }

        let config = FolderConfig {
            folder_name: name.to_string(),
        };
        config::save_json_file(&self.path, &config)?;
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config.folder_name.clone());

        info!("Folder set to {:?}", config.folder_name);
        Ok(config)
    }

    fn load(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        match config::load_json_file::<FolderConfig>(&self.path) {
            Ok(config) if !config.folder_name.trim().is_empty() => {
                Some(config.folder_name.trim().to_string())
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unreadable folder config: {:#}", e);
                None
            }
        }
    }
}

/// Find the label whose display name matches `folder_name`
///
/// Matching ignores case but is otherwise exact. `None` means the folder
/// does not exist, which callers treat as an empty result set.
pub fn resolve_folder(folder_name: &str, labels: &[Label]) -> Option<LabelId> {
    let wanted = folder_name.trim().to_lowercase();
    let wanted = if wanted.is_empty() {
        DEFAULT_FOLDER_NAME.to_lowercase()
    } else {
        wanted
    };

    labels
        .iter()
        .find(|label| label.name.to_lowercase() == wanted)
        .map(|label| label.id.clone())
}
