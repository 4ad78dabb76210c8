//! audioconv core library — configuration types, config file persistence, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes, [`MirrorConfig`] and the on-disk [`ConfigFile`]
//! - [`error`] — [`ConfigError`]
//! - [`config`] — load / save / init / resolve

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    Bitrate, ConfigFile, ConfigOverrides, Extension, ExtensionList, MirrorConfig, PathsSection,
    TranscodeRule, TranscodingSection,
};
