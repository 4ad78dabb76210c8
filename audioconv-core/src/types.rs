//! Domain types for audioconv configuration.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! The on-disk types are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BITRATE: u32 = 128_000;
pub const DEFAULT_OUTPUT_EXTENSION: &str = ".opus";
pub const DEFAULT_TRIGGER_EXTENSION: &str = ".flac";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A file extension, always stored with its leading dot (`".flac"`).
///
/// Matching against paths is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Extension(String);

impl Extension {
    /// Parse `"flac"` or `".flac"` into `".flac"`.
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if bare.is_empty() || bare.contains(['/', '\\', '.']) {
            return Err(ConfigError::InvalidExtension(raw.to_owned()));
        }
        Ok(Self(format!(".{bare}")))
    }

    /// The extension including its leading dot.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension without its leading dot, as used by [`Path::extension`].
    pub fn without_dot(&self) -> &str {
        &self.0[1..]
    }

    /// `true` when the final extension of `path` is exactly this one.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.without_dot())
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Extension {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Extension {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Extension> for String {
    fn from(ext: Extension) -> Self {
        ext.0
    }
}

/// Audio bitrate in bits per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Bitrate(u32);

impl Bitrate {
    pub fn new(bits_per_second: u32) -> Result<Self, ConfigError> {
        if bits_per_second == 0 {
            return Err(ConfigError::InvalidBitrate(bits_per_second.to_string()));
        }
        Ok(Self(bits_per_second))
    }

    pub fn bits_per_second(self) -> u32 {
        self.0
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self(DEFAULT_BITRATE)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Bitrate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidBitrate(s.to_owned()))?;
        Self::new(value)
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Bitrate> for u32 {
    fn from(b: Bitrate) -> Self {
        b.0
    }
}

/// A list of extensions that accepts either a YAML sequence or a
/// comma-separated string (`".flac,.wav"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExtensionListCompat", into = "Vec<Extension>")]
pub struct ExtensionList(pub Vec<Extension>);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtensionListCompat {
    List(Vec<String>),
    Joined(String),
}

impl TryFrom<ExtensionListCompat> for ExtensionList {
    type Error = ConfigError;

    fn try_from(raw: ExtensionListCompat) -> Result<Self, Self::Error> {
        match raw {
            ExtensionListCompat::List(items) => items
                .iter()
                .map(|s| Extension::new(s))
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            ExtensionListCompat::Joined(joined) => joined.parse(),
        }
    }
}

impl FromStr for ExtensionList {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Extension::new)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl From<ExtensionList> for Vec<Extension> {
    fn from(list: ExtensionList) -> Self {
        list.0
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Which source files get transcoded, and what extension their mirror gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRule {
    pub triggers: BTreeSet<Extension>,
    pub output: Extension,
}

impl TranscodeRule {
    pub fn new(
        triggers: impl IntoIterator<Item = Extension>,
        output: Extension,
    ) -> Self {
        Self {
            triggers: triggers.into_iter().collect(),
            output,
        }
    }

    /// `true` when `path`'s extension is one of the trigger extensions.
    pub fn wants_transcode(&self, path: &Path) -> bool {
        self.triggers.iter().any(|ext| ext.matches(path))
    }
}

impl Default for TranscodeRule {
    fn default() -> Self {
        Self::new(
            [Extension(DEFAULT_TRIGGER_EXTENSION.to_owned())],
            Extension(DEFAULT_OUTPUT_EXTENSION.to_owned()),
        )
    }
}

/// The single explicit configuration value handed to the sync engine.
///
/// Both roots are canonical absolute paths to existing directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub source: PathBuf,
    pub mirror: PathBuf,
    pub rule: TranscodeRule,
    pub bitrate: Bitrate,
    /// Encoder executable, looked up on `$PATH` when not absolute.
    pub ffmpeg: PathBuf,
    /// Worker threads for file actions; `0` means one per CPU.
    pub jobs: usize,
}

// ---------------------------------------------------------------------------
// On-disk config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PathsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TranscodingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<Bitrate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcode_to: Option<Extension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_transcode: Option<ExtensionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
}

/// Root of the audioconv YAML config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub transcoding: TranscodingSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Values supplied by a front end; every `Some` wins over the config file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub bitrate: Option<Bitrate>,
    pub transcode_to: Option<Extension>,
    pub to_transcode: Option<ExtensionList>,
    pub ffmpeg: Option<PathBuf>,
    pub jobs: Option<usize>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_normalizes_leading_dot() {
        assert_eq!(Extension::new("flac").unwrap(), Extension::new(".flac").unwrap());
        assert_eq!(Extension::new(" opus ").unwrap().as_str(), ".opus");
    }

    #[test]
    fn extension_rejects_garbage() {
        for raw in ["", ".", "a/b", "tar.gz"] {
            assert!(Extension::new(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        let flac = Extension::new(".flac").unwrap();
        assert!(flac.matches(Path::new("/a/song.flac")));
        assert!(!flac.matches(Path::new("/a/song.FLAC")));
        assert!(!flac.matches(Path::new("/a/.flac")));
        assert!(!flac.matches(Path::new("/a/song.flac.bak")));
    }

    #[test]
    fn bitrate_rejects_zero() {
        assert!(Bitrate::new(0).is_err());
        assert!("0".parse::<Bitrate>().is_err());
        assert_eq!("96000".parse::<Bitrate>().unwrap().bits_per_second(), 96_000);
    }

    #[test]
    fn extension_list_accepts_comma_string_and_sequence() {
        let joined: ExtensionList = serde_yaml::from_str("\".flac,.wav\"").unwrap();
        let seq: ExtensionList = serde_yaml::from_str("[flac, .wav]").unwrap();
        assert_eq!(joined, seq);
        assert_eq!(joined.0.len(), 2);
    }

    #[test]
    fn default_rule_transcodes_flac_to_opus() {
        let rule = TranscodeRule::default();
        assert!(rule.wants_transcode(Path::new("x/y.flac")));
        assert!(!rule.wants_transcode(Path::new("x/y.jpg")));
        assert_eq!(rule.output.as_str(), ".opus");
    }

    #[test]
    fn config_file_serde_roundtrip() {
        let file = ConfigFile {
            paths: PathsSection {
                source: Some(PathBuf::from("/music/lossless")),
                dest: Some(PathBuf::from("/music/portable")),
            },
            transcoding: TranscodingSection {
                bitrate: Some(Bitrate::new(96_000).unwrap()),
                ..Default::default()
            },
            jobs: Some(2),
        };
        let yaml = serde_yaml::to_string(&file).expect("serialize");
        let back: ConfigFile = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, file);
    }
}
