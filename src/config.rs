//! Config store (spec §4.G). Grounded on
//! `original_source/.../climpd-config.c`: a flat `Key = Value` file,
//! `#`/`;` comments, unknown keys logged and ignored, invalid values
//! logged and the previous/default value retained.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::strconvert::{str_to_bool, str_to_float, str_to_int};

#[derive(Debug, Clone)]
pub struct Config {
    pub meta_column_width: u32,
    pub volume: u8,
    pub pitch: f32,
    pub speed: f32,
    pub repeat: bool,
    pub shuffle: bool,
    pub keep_changes: bool,
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            meta_column_width: 32,
            volume: 100,
            pitch: 1.0,
            speed: 1.0,
            repeat: false,
            shuffle: false,
            keep_changes: false,
            path: default_path(),
        }
    }
}

pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".config/climp/climpd.conf")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = Config {
            path: path.to_path_buf(),
            ..Default::default()
        };

        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cfg),
            Err(e) => return Err(e.into()),
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(%line, "config line is not 'Key = Value' - ignoring");
                continue;
            };
            cfg.apply(key.trim(), value.trim());
        }

        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "ConsoleOutput.Meta_Column_Width" => match str_to_int(value) {
                Ok(n) if n >= 1 => self.meta_column_width = n as u32,
                _ => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "AudioPlayer.Volume" => match str_to_int(value) {
                Ok(n) => self.volume = n.clamp(0, 100) as u8,
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "AudioPlayer.Pitch" => match str_to_float(value) {
                Ok(f) => self.pitch = f.clamp(0.1, 10.0),
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "AudioPlayer.Speed" => match str_to_float(value) {
                Ok(f) => self.speed = f.clamp(0.1, 40.0),
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "AudioPlayer.Repeat" => match str_to_bool(value) {
                Ok(b) => self.repeat = b,
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "AudioPlayer.Shuffle" => match str_to_bool(value) {
                Ok(b) => self.shuffle = b,
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            "Config.Keep_Changes" => match str_to_bool(value) {
                Ok(b) => self.keep_changes = b,
                Err(_) => warn!(%key, %value, "invalid value - keeping previous"),
            },
            other => warn!(key = %other, "unknown config key - ignoring"),
        }
    }

    /// Canonical-form rewrite, used on shutdown when `Keep_Changes` is
    /// set (spec §4.J).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = format!(
            "ConsoleOutput.Meta_Column_Width = {}\n\
             AudioPlayer.Volume = {}\n\
             AudioPlayer.Pitch = {}\n\
             AudioPlayer.Speed = {}\n\
             AudioPlayer.Repeat = {}\n\
             AudioPlayer.Shuffle = {}\n\
             Config.Keep_Changes = {}\n",
            self.meta_column_width,
            self.volume,
            self.pitch,
            self.speed,
            self.repeat,
            self.shuffle,
            self.keep_changes,
        );
        fs::write(&self.path, body)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_is_ignored_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.conf");
        fs::write(&path, "Some.Bogus.Key = 5\nAudioPlayer.Volume = 42\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.volume, 42);
    }

    #[test]
    fn invalid_value_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.conf");
        fs::write(&path, "AudioPlayer.Pitch = not-a-float\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.pitch, Config::default().pitch);
    }

    #[test]
    fn out_of_range_volume_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.conf");
        fs::write(&path, "AudioPlayer.Volume = 9000\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.volume, 100);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.conf");
        fs::write(
            &path,
            "# a comment\n; another comment\n\nAudioPlayer.Volume = 55\n",
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.volume, 55);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.conf");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.volume, Config::default().volume);
    }
}
