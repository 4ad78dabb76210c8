//! YAML config file persistence and resolution into a [`MirrorConfig`].
//!
//! # Storage layout
//!
//! ```text
//! ./audioconv.yaml              (per-directory config, checked first)
//! ~/.audioconv/
//!   config.yaml                 (user config — mode 0600)
//! ```
//!
//! # API pattern
//!
//! Functions that touch the home directory have two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::{
    Bitrate, ConfigFile, ConfigOverrides, Extension, ExtensionList, MirrorConfig, PathsSection,
    TranscodeRule, TranscodingSection, DEFAULT_FFMPEG,
};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = "audioconv.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.audioconv/config.yaml` — pure, no I/O.
pub fn default_path_at(home: &Path) -> PathBuf {
    home.join(".audioconv").join("config.yaml")
}

/// `default_path_at` convenience wrapper.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(default_path_at(&home()?))
}

/// Find the config file to use when none was named explicitly.
///
/// `<cwd>/audioconv.yaml` wins over `<home>/.audioconv/config.yaml`.
pub fn discover_at(cwd: &Path, home: &Path) -> Option<PathBuf> {
    let local = cwd.join(LOCAL_CONFIG_NAME);
    if local.is_file() {
        return Some(local);
    }
    let user = default_path_at(home);
    user.is_file().then_some(user)
}

// ---------------------------------------------------------------------------
// 2. Load / save
// ---------------------------------------------------------------------------

/// Load a config file.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically save a config file.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(path: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| LOCAL_CONFIG_NAME.to_owned());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Init
// ---------------------------------------------------------------------------

/// Write a starter config naming `source` and `dest`, with every transcoding
/// default spelled out so it can be edited in place.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn init_at(
    path: &Path,
    source: PathBuf,
    dest: PathBuf,
    overrides: &ConfigOverrides,
    force: bool,
) -> Result<ConfigFile, ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::ConfigExists {
            path: path.to_path_buf(),
        });
    }

    let rule = TranscodeRule::default();
    let config = ConfigFile {
        paths: PathsSection {
            source: Some(source),
            dest: Some(dest),
        },
        transcoding: TranscodingSection {
            bitrate: Some(overrides.bitrate.unwrap_or_default()),
            transcode_to: Some(overrides.transcode_to.clone().unwrap_or(rule.output)),
            to_transcode: Some(
                overrides
                    .to_transcode
                    .clone()
                    .unwrap_or_else(|| ExtensionList(rule.triggers.into_iter().collect())),
            ),
            ffmpeg: Some(
                overrides
                    .ffmpeg
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG)),
            ),
        },
        jobs: overrides.jobs,
    };
    save_at(path, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 4. Resolve
// ---------------------------------------------------------------------------

/// Merge a config file (if any) with front-end overrides and validate the
/// result.
///
/// Both roots must already exist as directories; they are canonicalized so
/// every path the engine builds shares one spelling.
pub fn resolve(
    file: Option<ConfigFile>,
    overrides: ConfigOverrides,
) -> Result<MirrorConfig, ConfigError> {
    let file = file.unwrap_or_default();
    let defaults = TranscodeRule::default();

    let source = overrides
        .source
        .or(file.paths.source)
        .ok_or(ConfigError::MissingParameter("source"))?;
    let mirror = overrides
        .dest
        .or(file.paths.dest)
        .ok_or(ConfigError::MissingParameter("dest"))?;

    let source = canonical_dir(&source)
        .ok_or_else(|| ConfigError::SourceRootMissing { path: source.clone() })?;
    let mirror = canonical_dir(&mirror)
        .ok_or_else(|| ConfigError::MirrorRootMissing { path: mirror.clone() })?;
    if source.starts_with(&mirror) || mirror.starts_with(&source) {
        return Err(ConfigError::NestedRoots {
            source_root: source,
            mirror_root: mirror,
        });
    }

    let output: Extension = overrides
        .transcode_to
        .or(file.transcoding.transcode_to)
        .unwrap_or(defaults.output);
    let triggers = match overrides.to_transcode.or(file.transcoding.to_transcode) {
        Some(list) if list.0.is_empty() => {
            return Err(ConfigError::InvalidExtension(String::new()));
        }
        Some(list) => list.0.into_iter().collect(),
        None => defaults.triggers,
    };
    let bitrate: Bitrate = overrides
        .bitrate
        .or(file.transcoding.bitrate)
        .unwrap_or_default();
    let ffmpeg = overrides
        .ffmpeg
        .or(file.transcoding.ffmpeg)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG));
    let jobs = overrides.jobs.or(file.jobs).unwrap_or(0);

    Ok(MirrorConfig {
        source,
        mirror,
        rule: TranscodeRule { triggers, output },
        bitrate,
        ffmpeg,
        jobs,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn canonical_dir(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().ok()?;
    canonical.is_dir().then_some(canonical)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn roots() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let source = tmp.path().join("lossless");
        let mirror = tmp.path().join("portable");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&mirror).unwrap();
        (tmp, source, mirror)
    }

    #[test]
    fn default_path_is_under_dot_audioconv() {
        let home = TempDir::new().unwrap();
        assert!(default_path_at(home.path()).ends_with(".audioconv/config.yaml"));
    }

    #[test]
    fn discover_prefers_working_directory() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        assert_eq!(discover_at(cwd.path(), home.path()), None);

        let user = default_path_at(home.path());
        save_at(&user, &ConfigFile::default()).unwrap();
        assert_eq!(discover_at(cwd.path(), home.path()), Some(user));

        let local = cwd.path().join(LOCAL_CONFIG_NAME);
        std::fs::write(&local, "jobs: 1\n").unwrap();
        assert_eq!(discover_at(cwd.path(), home.path()), Some(local));
    }

    #[test]
    fn empty_file_loads_as_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audioconv.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(load_at(&path).unwrap(), ConfigFile::default());
    }

    #[test]
    fn resolve_applies_defaults() {
        let (_tmp, source, mirror) = roots();
        let config = resolve(
            None,
            ConfigOverrides {
                source: Some(source.clone()),
                dest: Some(mirror.clone()),
                ..Default::default()
            },
        )
        .expect("resolve");
        assert_eq!(config.source, source.canonicalize().unwrap());
        assert_eq!(config.mirror, mirror.canonicalize().unwrap());
        assert_eq!(config.bitrate.bits_per_second(), 128_000);
        assert_eq!(config.rule, TranscodeRule::default());
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.jobs, 0);
    }

    #[test]
    fn overrides_win_over_file() {
        let (_tmp, source, mirror) = roots();
        let file: ConfigFile = serde_yaml::from_str(&format!(
            "paths:\n  source: {}\n  dest: /does/not/exist\ntranscoding:\n  bitrate: 64000\n  transcode_to: .ogg\n",
            source.display()
        ))
        .unwrap();
        let config = resolve(
            Some(file),
            ConfigOverrides {
                dest: Some(mirror),
                bitrate: Some(Bitrate::new(192_000).unwrap()),
                ..Default::default()
            },
        )
        .expect("resolve");
        assert_eq!(config.bitrate.bits_per_second(), 192_000);
        assert_eq!(config.rule.output.as_str(), ".ogg");
    }

    #[test]
    fn missing_source_is_a_config_error() {
        let err = resolve(None, ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter("source")));
    }

    #[test]
    fn nonexistent_mirror_names_the_path() {
        let (tmp, source, _mirror) = roots();
        let missing = tmp.path().join("nope");
        let err = resolve(
            None,
            ConfigOverrides {
                source: Some(source),
                dest: Some(missing.clone()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MirrorRootMissing { .. }));
        assert!(err.to_string().contains(&missing.display().to_string()));
    }

    #[test]
    fn nested_roots_rejected() {
        let (_tmp, source, _mirror) = roots();
        let inner = source.join("mirror");
        std::fs::create_dir_all(&inner).unwrap();
        let err = resolve(
            None,
            ConfigOverrides {
                source: Some(source),
                dest: Some(inner),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NestedRoots { .. }));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg").join("config.yaml");
        let overrides = ConfigOverrides::default();
        init_at(&path, "/a".into(), "/b".into(), &overrides, false).expect("first init");
        let err = init_at(&path, "/a".into(), "/c".into(), &overrides, false).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigExists { .. }));

        let config = init_at(&path, "/a".into(), "/c".into(), &overrides, true).expect("force");
        assert_eq!(config.paths.dest, Some(PathBuf::from("/c")));
        assert_eq!(load_at(&path).unwrap(), config);
    }
}
