//! Persistent configuration: the client-version catalog and default settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{AssetVersion, Features};
use crate::util::{Error, Result};

const CONFIG_DIR: &str = "thingpack";

/// Config file path under the user's configuration directory.
fn config_path(file: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push(CONFIG_DIR);
        p.push(file);
        p
    })
}

/// Known client versions, keyed by version value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionCatalog {
    versions: Vec<AssetVersion>,
}

impl VersionCatalog {
    /// Catalog shipped with the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        catalog.add(AssetVersion::new(740, "Client 7.40", 0x41BF_619C, 0x41B9_EA86));
        catalog.add(AssetVersion::new(860, "Client 8.60", 0x4C2C_7993, 0x4C22_0594));
        catalog.add(AssetVersion::new(1098, "Client 10.98", 0x0000_42A3, 0x57BB_D603));
        catalog
    }

    /// Default location: `<config dir>/thingpack/versions.json`.
    pub fn default_path() -> Option<PathBuf> {
        config_path("versions.json")
    }

    /// Read a catalog from JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let mut catalog: Self = serde_json::from_str(&json)?;
        let listed = catalog.versions.len();
        catalog.versions.retain(AssetVersion::is_valid);
        if catalog.versions.len() != listed {
            warn!(path = %path.display(), skipped = listed - catalog.versions.len(), "ignored invalid catalog entries");
        }
        catalog.versions.sort_by_key(AssetVersion::value);
        debug!(path = %path.display(), count = catalog.versions.len(), "loaded version catalog");
        Ok(catalog)
    }

    /// The catalog at the default path, or the built-in one when there is none.
    pub fn load_or_builtin() -> Self {
        match Self::default_path().map(Self::load) {
            Some(Ok(catalog)) => catalog,
            Some(Err(Error::FileNotFound(_))) | None => Self::builtin(),
            Some(Err(err)) => {
                warn!(%err, "version catalog unreadable; using built-in versions");
                Self::builtin()
            }
        }
    }

    /// Write the catalog as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Insert a version, replacing one with the same value.
    pub fn add(&mut self, version: AssetVersion) {
        match self.versions.binary_search_by_key(&version.value(), AssetVersion::value) {
            Ok(i) => self.versions[i] = version,
            Err(i) => self.versions.insert(i, version),
        }
    }

    pub fn by_value(&self, value: u32) -> Option<&AssetVersion> {
        self.versions.iter().find(|v| v.value() == value)
    }

    /// Version whose archives carry exactly these signatures.
    pub fn by_signatures(&self, dat: u32, spr: u32) -> Option<&AssetVersion> {
        self.versions
            .iter()
            .find(|v| v.dat_signature() == dat && v.spr_signature() == spr)
    }

    /// Parse `"10.98"` or `"1098"` and look it up.
    pub fn find(&self, text: &str) -> Result<&AssetVersion> {
        let value = parse_version(text)?;
        self.by_value(value)
            .ok_or_else(|| Error::InvalidVersion(format!("{} is not in the version catalog", text)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Parse a client version written as `10.98`, `8.6` or `1098`.
pub fn parse_version(text: &str) -> Result<u32> {
    let bad = || Error::InvalidVersion(text.to_string());
    match text.split_once('.') {
        Some((major, minor)) => {
            let major: u32 = major.parse().map_err(|_| bad())?;
            let minor: u32 = match minor.len() {
                1 => minor.parse::<u32>().map_err(|_| bad())? * 10,
                2 => minor.parse().map_err(|_| bad())?,
                _ => return Err(bad()),
            };
            Ok(major * 100 + minor)
        }
        None => text.parse().map_err(|_| bad()),
    }
}

/// Defaults applied when a command does not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keep sprite alpha when writing archives
    pub transparency: bool,
    /// Force 32-bit sprite ids below 9.60
    pub extended: bool,
    /// zlib level for object blobs
    pub compression_level: u32,
    /// Catalog to use instead of the default location
    pub catalog: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transparency: false,
            extended: false,
            compression_level: 6,
            catalog: None,
        }
    }
}

impl Settings {
    /// Get settings file path
    pub fn path() -> Option<PathBuf> {
        config_path("settings.json")
    }

    /// Load settings; a missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let mut settings: Self = Self::path()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        settings.compression_level = settings.compression_level.min(9);
        settings
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| Error::other("no configuration directory"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Feature flags to request in addition to each version's mandatory set.
    pub fn requested_features(&self) -> Features {
        let mut features = Features::empty();
        features.set(Features::TRANSPARENCY, self.transparency);
        features.set(Features::EXTENDED, self.extended);
        features
    }

    /// The configured catalog, falling back to the default one.
    pub fn catalog(&self) -> Result<VersionCatalog> {
        match &self.catalog {
            Some(path) => VersionCatalog::load(path),
            None => Ok(VersionCatalog::load_or_builtin()),
        }
    }
}
