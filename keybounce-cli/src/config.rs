use anyhow::{bail, Context, Result};
use keybounce_filter::{FilterConfig, Keycode, DEFAULT_WINDOW};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accepted range for the debounce window, in milliseconds.
const WINDOW_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=2000;

/// Contents of `config.toml`. Every field is optional; flags fill the gaps.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub keycode: Option<Keycode>,
    pub window_ms: Option<u64>,
    pub device: Option<PathBuf>,
}

/// Values given on the command line. These win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub keycode: Option<Keycode>,
    pub window_ms: Option<u64>,
    pub device: Option<PathBuf>,
}

/// Effective settings for a `run`.
#[derive(Debug)]
pub struct Settings {
    pub filter: FilterConfig,
    pub device: Option<PathBuf>,
}

/// `$XDG_CONFIG_HOME/keybounce/config.toml` or the platform equivalent.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keybounce").join("config.toml"))
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Load the explicit config file, or the default one if it exists.
///
/// A missing explicit file is an error; a missing default file is not.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    load_or_default(explicit, default_path())
}

fn load_or_default(explicit: Option<&Path>, default: Option<PathBuf>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    match default {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "loading default config");
            load_file(&path)
        }
        _ => Ok(FileConfig::default()),
    }
}

pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Settings> {
    let Some(keycode) = overrides.keycode.or(file.keycode) else {
        bail!("no target key given: pass --key <KEYCODE> or set `keycode` in the config file (use `keybounce keys` to find it)");
    };

    let window = match overrides.window_ms.or(file.window_ms) {
        Some(ms) => {
            if !WINDOW_RANGE_MS.contains(&ms) {
                bail!(
                    "window of {} ms is outside {}..={} ms",
                    ms,
                    WINDOW_RANGE_MS.start(),
                    WINDOW_RANGE_MS.end()
                );
            }
            Duration::from_millis(ms)
        }
        None => DEFAULT_WINDOW,
    };

    Ok(Settings {
        filter: FilterConfig::new(keycode).with_window(window),
        device: overrides.device.or(file.device),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config("keycode = 11\nwindow_ms = 150\ndevice = \"/dev/input/event3\"\n");
        let config = load_file(file.path()).unwrap();
        assert_eq!(
            config,
            FileConfig {
                keycode: Some(11),
                window_ms: Some(150),
                device: Some(PathBuf::from("/dev/input/event3")),
            }
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = write_config("keycode = 11\nthreshold = 5\n");
        assert!(load_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_missing_default_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("keybounce").join("config.toml");
        assert_eq!(load_or_default(None, Some(default)).unwrap(), FileConfig::default());
        assert_eq!(load_or_default(None, None).unwrap(), FileConfig::default());
    }

    #[test]
    fn test_default_file_used_when_present() {
        let file = write_config("keycode = 48\n");
        let config = load_or_default(None, Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.keycode, Some(48));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_without_config_in_xdg_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        assert_eq!(
            default_path(),
            Some(dir.path().join("keybounce").join("config.toml"))
        );
        assert_eq!(load(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(
            FileConfig {
                keycode: Some(11),
                ..Default::default()
            },
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.filter, FilterConfig::new(11));
        assert_eq!(settings.filter.window, Duration::from_millis(200));
        assert_eq!(settings.device, None);
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig {
            keycode: Some(11),
            window_ms: Some(150),
            device: Some(PathBuf::from("/dev/input/event3")),
        };
        let overrides = Overrides {
            keycode: Some(48),
            window_ms: Some(80),
            device: None,
        };
        let settings = resolve(file, overrides).unwrap();
        assert_eq!(settings.filter.target_keycode, 48);
        assert_eq!(settings.filter.window, Duration::from_millis(80));
        assert_eq!(settings.device, Some(PathBuf::from("/dev/input/event3")));
    }

    #[test]
    fn test_missing_keycode() {
        assert!(resolve(FileConfig::default(), Overrides::default()).is_err());
    }

    #[test]
    fn test_window_out_of_range() {
        for ms in [0, 2001] {
            let overrides = Overrides {
                keycode: Some(11),
                window_ms: Some(ms),
                device: None,
            };
            assert!(resolve(FileConfig::default(), overrides).is_err(), "{} ms", ms);
        }
    }
}
