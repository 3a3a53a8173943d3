use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::loader::home_dir;
use crate::feed::recency::RecencyWindow;
use crate::filter::FilterState;

/// Environment override for the preference file location.
pub const PREFS_ENV: &str = "MODFEED_PREFS";

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed preferences: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("preset name must not be empty")]
    EmptyName,
    #[error("no preset named \"{0}\"")]
    UnknownPreset(String),
    #[error("\"{0}\" is the active preset; deleting it needs confirmation")]
    ConfirmationRequired(String),
}

/// Everything mirrored to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Prefs {
    pub filter: FilterState,
    /// Pre-check the dry-run box of the generic action prompt.
    pub always_dry_run: bool,
    /// Unset until the user picks one; the configured window applies.
    pub recency_window: Option<RecencyWindow>,
    pub presets: BTreeMap<String, FilterState>,
    pub active_preset: Option<String>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            filter: FilterState::default(),
            always_dry_run: true,
            recency_window: None,
            presets: BTreeMap::new(),
            active_preset: None,
        }
    }
}

impl Prefs {
    pub fn from_json(json: &str) -> Result<Self, PrefsError> {
        let mut prefs: Self = serde_json::from_str(json)?;
        prefs.filter.normalize();
        for preset in prefs.presets.values_mut() {
            preset.normalize();
        }
        if prefs
            .active_preset
            .as_ref()
            .is_some_and(|name| !prefs.presets.contains_key(name))
        {
            prefs.active_preset = None;
        }
        Ok(prefs)
    }
}

/// Default location: `$MODFEED_PREFS`, else `$XDG_STATE_HOME/modfeed/prefs.json`,
/// else `~/.local/state/modfeed/prefs.json`.
pub fn default_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(PREFS_ENV) {
        return Some(PathBuf::from(path));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("modfeed/prefs.json"));
    }
    home_dir().map(|h| h.join(".local/state/modfeed/prefs.json"))
}

/// Preferences bound to a file, or kept in memory only.
#[derive(Debug, Default)]
pub struct PrefStore {
    path: Option<PathBuf>,
    prefs: Prefs,
}

impl PrefStore {
    /// A store that never touches the disk.
    pub fn in_memory(prefs: Prefs) -> Self {
        Self { path: None, prefs }
    }

    /// Read `path`; a missing file yields defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let prefs = match std::fs::read_to_string(&path) {
            Ok(json) => Prefs::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Prefs::default(),
            Err(source) => return Err(PrefsError::Io { path, source }),
        };
        Ok(Self {
            path: Some(path),
            prefs,
        })
    }

    /// Like [`open`](Self::open), but a damaged file falls back to defaults.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("prefs: {e}; starting from defaults");
                Self {
                    path: Some(path),
                    prefs: Prefs::default(),
                }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    /// Mutate and persist in one step.
    pub fn update<R>(
        &mut self,
        f: impl FnOnce(&mut Prefs) -> Result<R, PrefsError>,
    ) -> Result<R, PrefsError> {
        let out = f(&mut self.prefs)?;
        self.save()?;
        Ok(out)
    }

    /// Replace the stored filter, e.g. after every filter change.
    pub fn set_filter(&mut self, filter: &FilterState) -> Result<(), PrefsError> {
        if self.prefs.filter == *filter {
            return Ok(());
        }
        self.update(|p| {
            p.filter = filter.clone();
            Ok(())
        })
    }

    /// Write through a temporary file so a crash never leaves half a file.
    pub fn save(&self) -> Result<(), PrefsError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let io = |source| PrefsError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(&self.prefs)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)?;
        tracing::debug!("prefs: saved {}", path.display());
        Ok(())
    }
}
