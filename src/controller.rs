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
use std::future::{self, Future};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, warn, Level};

use crate::engine::PlaybackEvent;
use crate::session::{Category, Session, SessionError};

pub mod keyboard;

/// Controller events that drive the session.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Starts playback, optionally from the given position.
    Play(Option<Duration>),

    /// Stops playback. If nothing is playing, only the notes off sweep is sent.
    Stop,

    /// Plays when stopped, stops when playing.
    TogglePlayback,

    /// Flips looping.
    ToggleLoop,

    /// Sets the loop region.
    LoopPoints { start: Duration, end: Duration },

    /// Resets the loop region to the whole file.
    ClearLoopPoints,

    /// Sets the tempo factor.
    Tempo(f64),

    /// Moves to the next file.
    Next,

    /// Moves to the previous file.
    Prev,

    /// Classifies the current file and moves on.
    Classify(Category),

    /// Sets the comment recorded with the next classification.
    Comment(String),

    /// Prints the classification summary.
    Stats,

    /// Prints where the session is.
    Status,

    /// Exports all classifications.
    Export,

    /// Rescans the MIDI directory.
    Refresh,

    /// Ends the session.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// How long a closing controller waits for its driver to stop.
const DRIVER_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Drives a classification session.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(session: Session, driver: Arc<dyn Driver>) -> Controller {
        Controller::with_shutdown(session, driver, future::pending::<()>())
    }

    /// Creates a new controller that also quits once the shutdown future completes, even if
    /// the driver is blocked waiting for input.
    pub fn with_shutdown<F>(session: Session, driver: Arc<dyn Driver>, shutdown: F) -> Controller
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Controller {
            handle: tokio::spawn(async move {
                Controller::trigger_events(session, driver, shutdown).await
            }),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver to the session until the driver quits or closes, or
    /// the shutdown future completes.
    async fn trigger_events<F>(mut session: Session, driver: Arc<dyn Driver>, shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let watcher = watch_playback(session.engine().events());
        tokio::pin!(shutdown);

        info!(
            files = session.files().len(),
            device = session.engine().device_name(),
            "Controller started."
        );

        loop {
            let event = tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested.");
                    Event::Quit
                }
            };
            info!(event = format!("{:?}", event), "Received event.");
            if event == Event::Quit {
                break;
            }
            if let Err(e) = apply(&mut session, event) {
                error!("Error talking to session: {}", e);
            }
        }

        info!("Controller closing.");
        // Dropping the session stops playback and closes the engine's event channel.
        drop(session);
        drop(events_rx);
        match tokio::time::timeout(DRIVER_STOP_TIMEOUT, join_handle).await {
            Ok(Ok(Ok(()))) => (),
            Ok(Ok(Err(e))) => error!("Event monitor failed: {}", e),
            Ok(Err(e)) => error!("Error waiting for event monitor to stop: {}", e),
            Err(_) => warn!("Event monitor did not stop in time, leaving it behind."),
        }
        if let Err(e) = watcher.await {
            error!("Error waiting for playback watcher to stop: {}", e);
        }
    }
}

/// Applies a single event to the session.
fn apply(session: &mut Session, event: Event) -> Result<(), SessionError> {
    match event {
        Event::Play(start) => session.engine_mut().play(start)?,
        Event::Stop => session.engine_mut().stop(),
        Event::TogglePlayback => session.toggle_playback()?,
        Event::ToggleLoop => {
            let looping = session.engine().toggle_loop();
            println!("Looping {}", if looping { "on" } else { "off" });
        }
        Event::LoopPoints { start, end } => session.engine().set_loop_points(start, end),
        Event::ClearLoopPoints => session.engine().clear_loop_points(),
        Event::Tempo(tempo) => session.engine().set_tempo(tempo),
        Event::Next => session.next()?,
        Event::Prev => session.prev()?,
        Event::Classify(category) => session.classify(category)?,
        Event::Comment(comment) => session.set_comment(&comment),
        Event::Stats => println!("{}", session.stats().summary()),
        Event::Status => println!("{}", session.status()),
        Event::Export => {
            let exported = session.export()?;
            println!(
                "Exported to {}, {} and {}",
                exported.csv.display(),
                exported.xlsx.display(),
                exported.json.display()
            );
        }
        Event::Refresh => session.refresh()?,
        Event::Quit => (),
    }
    Ok(())
}

/// Logs playback notifications until the engine goes away.
fn watch_playback(events: Receiver<PlaybackEvent>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let span = span!(Level::INFO, "playback watcher");
        let _enter = span.enter();

        for event in events.iter() {
            match event {
                PlaybackEvent::Started { position } => {
                    info!(position = ?position, "Playback started.")
                }
                PlaybackEvent::Looped { pass } => info!(pass, "Playback looped."),
                PlaybackEvent::Finished { position } => {
                    info!(position = ?position, "Playback finished.")
                }
                PlaybackEvent::Interrupted(e) => {
                    warn!(err = %e, "Playback interrupted by the device.")
                }
            }
        }
    })
}
