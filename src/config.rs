// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use serde::Deserialize;

use crate::{engine, util};

pub use self::error::ConfigError;

mod error;

const DEFAULT_MIDI_DIR: &str = "midi_files";
const DEFAULT_PROGRESS_FILE: &str = "classification_progress.json";
const DEFAULT_EXPORT_DIR: &str = ".";

/// The configuration for a classification session. Every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Classifier {
    /// The output device to bind to. The first available port is used when absent.
    device: Option<String>,
    /// The directory scanned for MIDI files.
    midi_dir: Option<PathBuf>,
    /// Where classification progress is saved.
    progress_file: Option<PathBuf>,
    /// Where exports are written.
    export_dir: Option<PathBuf>,
    /// The initial tempo factor.
    tempo: Option<f64>,
    /// How long stopping waits for the scheduling thread, e.g. `500ms`.
    stop_timeout: Option<String>,
}

impl Classifier {
    /// Parses the classifier configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Classifier, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Classifier>()?)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn midi_dir(&self) -> PathBuf {
        self.midi_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIDI_DIR))
    }

    pub fn progress_file(&self) -> PathBuf {
        self.progress_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS_FILE))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR))
    }

    /// The initial tempo, clamped into the supported range.
    pub fn tempo(&self) -> f64 {
        engine::clamp_tempo(self.tempo.unwrap_or(1.0))
    }

    pub fn stop_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.stop_timeout {
            Some(stop_timeout) => {
                util::parse_duration(stop_timeout).map_err(ConfigError::Duration)
            }
            None => Ok(engine::DEFAULT_STOP_TIMEOUT),
        }
    }
}
