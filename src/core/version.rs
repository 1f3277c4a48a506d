//! Client version descriptors.

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Metadata record layout revision.
///
/// Each revision renumbers or extends the flag bytes of an object record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetadataFormat {
    /// 7.10 - 7.30
    V1,
    /// 7.40 - 7.50
    V2,
    /// 7.55 - 7.72
    V3,
    /// 7.80 - 8.54
    V4,
    /// 8.60 - 9.86
    V5,
    /// 10.10 and later
    V6,
}

impl MetadataFormat {
    /// Format used by a numeric client version (e.g. `860` for 8.60).
    pub fn for_client(value: u32) -> Self {
        match value {
            0..=730 => Self::V1,
            731..=750 => Self::V2,
            751..=772 => Self::V3,
            773..=854 => Self::V4,
            855..=986 => Self::V5,
            _ => Self::V6,
        }
    }
}

/// A known client build: its version number and the signatures of its two archives.
///
/// Immutable once constructed; the metadata format is derived from `value`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "VersionRecord", into = "VersionRecord")]
pub struct AssetVersion {
    value: u32,
    description: String,
    dat_signature: u32,
    spr_signature: u32,
    format: MetadataFormat,
}

impl AssetVersion {
    /// Create a descriptor.
    pub fn new(value: u32, description: impl Into<String>, dat_signature: u32, spr_signature: u32) -> Self {
        Self {
            value,
            description: description.into(),
            dat_signature,
            spr_signature,
            format: MetadataFormat::for_client(value),
        }
    }

    /// Descriptor carrying only a version number, for blob formats that embed no signatures.
    pub fn unsigned(value: u32) -> Self {
        Self::new(value, format!("Client {}.{:02}", value / 100, value % 100), 0, 0)
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn dat_signature(&self) -> u32 {
        self.dat_signature
    }

    #[inline]
    pub fn spr_signature(&self) -> u32 {
        self.spr_signature
    }

    #[inline]
    pub fn format(&self) -> MetadataFormat {
        self.format
    }

    /// A version is usable for archives only if its value and both signatures are set.
    pub fn is_valid(&self) -> bool {
        self.value != 0 && self.dat_signature != 0 && self.spr_signature != 0
    }

    /// Return an error unless [`is_valid`](Self::is_valid).
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidVersion(self.to_string()))
        }
    }
}

impl std::fmt::Display for AssetVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (dat 0x{:08X}, spr 0x{:08X})",
            self.description, self.dat_signature, self.spr_signature
        )
    }
}

/// Serialized shape of [`AssetVersion`]; the format is recomputed on load.
#[derive(Serialize, Deserialize)]
struct VersionRecord {
    value: u32,
    description: String,
    dat_signature: u32,
    spr_signature: u32,
}

impl From<VersionRecord> for AssetVersion {
    fn from(r: VersionRecord) -> Self {
        Self::new(r.value, r.description, r.dat_signature, r.spr_signature)
    }
}

impl From<AssetVersion> for VersionRecord {
    fn from(v: AssetVersion) -> Self {
        Self {
            value: v.value,
            description: v.description,
            dat_signature: v.dat_signature,
            spr_signature: v.spr_signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_boundaries() {
        assert_eq!(MetadataFormat::for_client(710), MetadataFormat::V1);
        assert_eq!(MetadataFormat::for_client(740), MetadataFormat::V2);
        assert_eq!(MetadataFormat::for_client(755), MetadataFormat::V3);
        assert_eq!(MetadataFormat::for_client(780), MetadataFormat::V4);
        assert_eq!(MetadataFormat::for_client(860), MetadataFormat::V5);
        assert_eq!(MetadataFormat::for_client(986), MetadataFormat::V5);
        assert_eq!(MetadataFormat::for_client(1010), MetadataFormat::V6);
        assert!(MetadataFormat::V3 < MetadataFormat::V6);
    }

    #[test]
    fn test_validity() {
        assert!(AssetVersion::new(860, "Client 8.60", 1, 2).is_valid());
        assert!(!AssetVersion::new(860, "Client 8.60", 0, 2).is_valid());
        assert!(!AssetVersion::unsigned(860).is_valid());
        assert!(matches!(AssetVersion::new(0, "", 1, 1).validate(), Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_json_round_trip_recomputes_format() {
        let v = AssetVersion::new(1098, "Client 10.98", 0x42A3, 0x57BBD603);
        let json = serde_json::to_string(&v).unwrap();
        assert!(!json.contains("format"));
        let back: AssetVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.format(), MetadataFormat::V6);
    }
}
