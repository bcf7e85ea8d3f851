//! Configuration file and data directory resolution for the CLI.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use stream_downloader::{EngineKind, FileMode, Settings};

const APP_DIR_NAME: &str = "stream-downloader";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings plus where they came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Effective settings (defaults when no file was loaded).
    pub settings: Settings,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/stream-downloader/config.toml`
/// 2. `$HOME/.config/stream-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

/// Resolves the directory holding the queue and history files.
///
/// Priority:
/// 1. `--data-dir`
/// 2. `$XDG_DATA_HOME/stream-downloader`
/// 3. `$HOME/.local/share/stream-downloader`
/// 4. `./.stream-downloader`
#[must_use]
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join(APP_DIR_NAME);
    }
    if let Some(home) = env_var_non_empty_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME);
    }
    PathBuf::from(format!(".{APP_DIR_NAME}"))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads settings from `explicit` or the default path.
///
/// A missing default file yields default settings; a missing explicit file
/// is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let settings = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            settings,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let settings = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                settings,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            settings: Settings::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<Settings> {
    let mut settings = Settings::default();
    let downloads = &mut settings.downloads;

    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "downloads.engine" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
                downloads.engine = parsed.parse::<EngineKind>().map_err(|e| {
                    anyhow::anyhow!("{e} on line {line_no}; expected \"internal\" or \"ffmpeg\"")
                })?;
            }
            "downloads.directory" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
                downloads.directory = PathBuf::from(parsed);
            }
            "downloads.filemode" => {
                let parsed = parse_integer_i64(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
                downloads.filemode = FileMode::from(parsed);
            }
            "downloads.filetemplate" => {
                downloads.filetemplate = parse_string_literal(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
            }
            "downloads.history" => {
                downloads.history = parse_boolean(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
            }
            "downloads.ffmpeg_path" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
                if parsed.is_empty() {
                    bail!("Invalid `{key}` value on line {line_no}: path must not be empty");
                }
                downloads.ffmpeg_path = PathBuf::from(parsed);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(settings)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_i64(raw_value: &str) -> Result<i64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    Ok(token.parse::<i64>()?)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let raw = r#"
# downloads
downloads.engine = "ffmpeg"
downloads.directory = "/srv/videos"   # inline comment
downloads.filemode = 1
downloads.filetemplate = "%%username%%-%%videotitle%%"
downloads.history = false
downloads.ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
"#;
        let settings = parse_config_str(raw).unwrap();
        let downloads = settings.downloads;
        assert_eq!(downloads.engine, EngineKind::Ffmpeg);
        assert_eq!(downloads.directory, PathBuf::from("/srv/videos"));
        assert_eq!(downloads.filemode, FileMode::Templated);
        assert_eq!(downloads.filetemplate, "%%username%%-%%videotitle%%");
        assert!(!downloads.history);
        assert_eq!(downloads.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_parse_config_partial_fields_keep_defaults() {
        let settings = parse_config_str("downloads.filemode = 0\n").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_config_hash_inside_string_is_not_comment() {
        let settings =
            parse_config_str("downloads.filetemplate = \"#%%videoid%%\" # trailing").unwrap();
        assert_eq!(settings.downloads.filetemplate, "#%%videoid%%");
    }

    #[test]
    fn test_parse_config_unknown_key_names_line() {
        let err = parse_config_str("\ndownloads.speed = 3").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("downloads.speed"), "{message}");
        assert!(message.contains("line 2"), "{message}");
    }

    #[test]
    fn test_parse_config_rejects_bad_engine() {
        let err = parse_config_str("downloads.engine = \"wget\"").unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string_and_bad_bool() {
        assert!(parse_config_str("downloads.directory = /tmp").is_err());
        assert!(parse_config_str("downloads.history = yes").is_err());
        assert!(parse_config_str("downloads.filemode = one").is_err());
        assert!(parse_config_str("downloads.ffmpeg_path = \"\"").is_err());
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("downloads.history").unwrap_err();
        assert!(err.to_string().contains("expected key = value"));
    }

    #[test]
    fn test_load_config_explicit_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_config_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "downloads.history = false\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert!(!loaded.settings.downloads.history);
    }

    #[test]
    fn test_resolve_data_dir_prefers_explicit() {
        let dir = PathBuf::from("/var/lib/sd");
        assert_eq!(resolve_data_dir(Some(&dir)), dir);
    }
}
