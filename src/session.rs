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
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, info, span, warn, Level, Span};

use crate::{
    engine::{Engine, EngineError},
    performance::DecodeError,
    util::{duration_display, filename_display},
};

pub use self::export::Exported;
pub use self::stats::{Category, Stats, Summary};

mod compat;
mod export;
mod stats;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed progress: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to export: {0}")]
    Csv(#[from] csv::Error),

    #[error("unable to export: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A single verdict on a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub file: String,
    pub classification: Category,
    #[serde(default)]
    pub comments: String,
    #[serde(alias = "time_spent", deserialize_with = "compat::time_spent")]
    pub time_spent_secs: f64,
    #[serde(deserialize_with = "compat::timestamp")]
    pub timestamp: DateTime<Local>,
}

/// The saved state of a session.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Progress {
    classifications: Vec<Classification>,
    stats: BTreeMap<Category, u64>,
    total_time_seconds: f64,
}

/// Walks through a directory of MIDI files, playing each and recording a verdict for it.
pub struct Session {
    engine: Engine,
    midi_dir: PathBuf,
    progress_file: PathBuf,
    export_dir: PathBuf,
    files: Vec<PathBuf>,
    index: usize,
    /// The file loaded into the engine, if any.
    current: Option<PathBuf>,
    started: Instant,
    comment: String,
    classifications: Vec<Classification>,
    stats: Stats,
    span: Span,
}

impl Session {
    /// Creates a session over the given directory, creating the directory if needed.
    /// Saved progress is picked up and the first file is loaded.
    pub fn new(
        engine: Engine,
        midi_dir: &Path,
        progress_file: &Path,
        export_dir: &Path,
    ) -> Result<Session, SessionError> {
        let mut session = Session {
            engine,
            midi_dir: midi_dir.to_path_buf(),
            progress_file: progress_file.to_path_buf(),
            export_dir: export_dir.to_path_buf(),
            files: Vec::new(),
            index: 0,
            current: None,
            started: Instant::now(),
            comment: String::new(),
            classifications: Vec::new(),
            stats: Stats::default(),
            span: span!(Level::INFO, "session"),
        };

        session.load_progress()?;
        session.files = scan(&session.midi_dir)?;
        if !session.files.is_empty() {
            // Already logged, the rest of the files are still reachable.
            let _ = session.load_current();
        }
        Ok(session)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
    }

    pub fn classifications(&self) -> &[Classification] {
        &self.classifications
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Moves to the next file, wrapping around at the end.
    pub fn next(&mut self) -> Result<(), SessionError> {
        if self.files.is_empty() {
            return Ok(());
        }
        self.engine.stop();
        self.index = (self.index + 1) % self.files.len();
        self.load_current()
    }

    /// Moves to the previous file, wrapping around at the start.
    pub fn prev(&mut self) -> Result<(), SessionError> {
        if self.files.is_empty() {
            return Ok(());
        }
        self.engine.stop();
        self.index = (self.index + self.files.len() - 1) % self.files.len();
        self.load_current()
    }

    /// Plays when stopped, stops when playing. Does not start playback if the current
    /// file could not be loaded.
    pub fn toggle_playback(&mut self) -> Result<(), SessionError> {
        if self.engine.is_playing() {
            self.engine.stop();
        } else if self.current.is_some() {
            self.engine.play(None)?;
        } else {
            let _enter = self.span.enter();
            warn!("No file loaded, nothing to play.");
        }
        Ok(())
    }

    /// Records a verdict for the current file, saves progress and moves on. Does nothing
    /// if no file is loaded.
    pub fn classify(&mut self, category: Category) -> Result<(), SessionError> {
        let file = match &self.current {
            Some(file) => file.display().to_string(),
            None => {
                let _enter = self.span.enter();
                warn!(category = %category, "No file loaded, nothing to classify.");
                return Ok(());
            }
        };

        let time_spent = self.started.elapsed();
        let classification = Classification {
            file,
            classification: category,
            comments: std::mem::take(&mut self.comment),
            time_spent_secs: time_spent.as_secs_f64(),
            timestamp: Local::now(),
        };
        {
            let _enter = self.span.enter();
            info!(
                file = %classification.file,
                category = %category,
                time_spent = ?time_spent,
                "Classified."
            );
        }

        self.classifications.push(classification);
        self.stats.update(category, time_spent);
        self.save_progress()?;
        self.next()
    }

    /// Rescans the directory and starts over at the first file.
    pub fn refresh(&mut self) -> Result<(), SessionError> {
        self.files = scan(&self.midi_dir)?;
        self.index = 0;
        if self.files.is_empty() {
            return Ok(());
        }
        self.engine.stop();
        self.load_current()
    }

    /// Writes all classifications to the export directory.
    pub fn export(&self) -> Result<Exported, SessionError> {
        let exported = export::export(&self.export_dir, &self.classifications, Local::now())?;
        let _enter = self.span.enter();
        info!(
            csv = %exported.csv.display(),
            xlsx = %exported.xlsx.display(),
            json = %exported.json.display(),
            count = self.classifications.len(),
            "Exported classifications."
        );
        Ok(exported)
    }

    /// A one line description of where the session is.
    pub fn status(&self) -> String {
        let file = match &self.current {
            Some(current) => format!(
                "File {}/{}: {}",
                self.index + 1,
                self.files.len(),
                filename_display(current)
            ),
            None => "No file loaded".to_string(),
        };
        let points = self.engine.loop_points();
        format!(
            "{} | {} | position {} | tempo {:.2}x | loop {} ({} - {})",
            file,
            if self.engine.is_playing() {
                "playing"
            } else {
                "stopped"
            },
            duration_display(self.engine.position()),
            self.engine.tempo(),
            if self.engine.is_looping() { "on" } else { "off" },
            duration_display(points.start),
            duration_display(points.end),
        )
    }

    fn load_current(&mut self) -> Result<(), SessionError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let path = self.files[self.index].clone();
        self.comment.clear();
        self.started = Instant::now();
        if let Err(e) = self.engine.load_file(&path) {
            error!(file = %path.display(), err = %e, "Unable to load file.");
            self.current = None;
            return Err(e.into());
        }
        info!(
            file = filename_display(&path),
            number = self.index + 1,
            total = self.files.len(),
            "Now classifying."
        );
        self.current = Some(path);
        Ok(())
    }

    fn load_progress(&mut self) -> Result<(), SessionError> {
        let contents = match fs::read_to_string(&self.progress_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.progress_file.clone(),
                    source,
                })
            }
        };

        let progress: Progress = serde_json::from_str(&contents)?;
        self.stats = Stats::from_counts(
            &progress.stats,
            Duration::try_from_secs_f64(progress.total_time_seconds).unwrap_or_default(),
        );
        self.classifications = progress.classifications;

        let _enter = self.span.enter();
        info!(
            classified = self.classifications.len(),
            "Loaded progress."
        );
        Ok(())
    }

    fn save_progress(&self) -> Result<(), SessionError> {
        let progress = Progress {
            classifications: self.classifications.clone(),
            stats: self.stats.counts(),
            total_time_seconds: self.stats.total_time().as_secs_f64(),
        };
        fs::write(&self.progress_file, serde_json::to_string(&progress)?).map_err(|source| {
            SessionError::Io {
                path: self.progress_file.clone(),
                source,
            }
        })
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}

/// Lists the MIDI files directly inside the directory, sorted. The directory is created
/// if it does not exist.
fn scan(dir: &Path) -> Result<Vec<PathBuf>, SessionError> {
    let io_error = |source| SessionError::Io {
        path: dir.to_path_buf(),
        source,
    };

    if !dir.exists() {
        fs::create_dir_all(dir).map_err(io_error)?;
        info!(dir = %dir.display(), "Created directory, add MIDI files to it.");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && is_midi_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        warn!(dir = %dir.display(), "No MIDI files found.");
    }
    Ok(files)
}

fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}
