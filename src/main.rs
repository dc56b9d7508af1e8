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
use std::error::Error;
use std::future;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use midisift::config::Classifier;
use midisift::controller::{keyboard, Controller};
use midisift::engine::{Engine, PlaybackEvent};
use midisift::midi::{self, DeviceError};
use midisift::performance::{self, EventKind};
use midisift::session::Session;
use midisift::util::{filename_display, parse_duration};
use tracing::warn;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI player for auditioning and classifying MIDI files."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI output devices.
    Devices {},
    /// Prints what a MIDI file contains.
    Inspect {
        /// The MIDI file to inspect.
        path: PathBuf,
    },
    /// Plays a MIDI file through an output device and waits until it ends.
    Play {
        /// The MIDI file to play.
        path: PathBuf,
        /// The output device to play through. Defaults to the first available device.
        #[arg[short, long]]
        device: Option<String>,
        /// The tempo factor, between 0.25 and 2.0.
        #[arg[short, long, default_value_t = 1.0]]
        tempo: f64,
        /// Loops until interrupted with Ctrl-C.
        #[arg[short, long]]
        looping: bool,
        /// Where a loop restarts, e.g. 1.5 or 1500ms.
        #[arg[long, value_parser = parse_duration]]
        loop_start: Option<Duration>,
        /// Where a loop is triggered, e.g. 8 or 8s.
        #[arg[long, value_parser = parse_duration]]
        loop_end: Option<Duration>,
    },
    /// Starts an interactive classification session.
    Classify {
        /// The path to the session config.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = match midi::enumerate() {
                Ok(devices) => devices,
                Err(DeviceError::NoOutputDevice) => {
                    println!("No devices found.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Inspect { path } => {
            let performance = performance::decode(&path)?;
            println!("{}: {}", filename_display(&path), performance);

            let count = |kind: EventKind| {
                performance
                    .events()
                    .iter()
                    .filter(|event| event.kind() == kind)
                    .count()
            };
            println!("- Note on: {}", count(EventKind::NoteOn));
            println!("- Note off: {}", count(EventKind::NoteOff));
            println!("- Other: {}", count(EventKind::Other));
        }
        Commands::Play {
            path,
            device,
            tempo,
            looping,
            loop_start,
            loop_end,
        } => {
            let mut engine = Engine::connect(device.as_deref())?;
            engine.load_file(&path)?;
            engine.set_tempo(tempo);
            if loop_start.is_some() || loop_end.is_some() {
                let points = engine.loop_points();
                engine.set_loop_points(
                    loop_start.unwrap_or(points.start),
                    loop_end.unwrap_or(points.end),
                );
            }
            if looping {
                engine.toggle_loop();
            }

            let events = engine.events();
            engine.play(None)?;
            println!("Playing {} on {}.", filename_display(&path), engine.device_name());

            let finished = tokio::task::spawn_blocking(move || {
                for event in events.iter() {
                    match event {
                        PlaybackEvent::Finished { .. } => return Ok(()),
                        PlaybackEvent::Interrupted(e) => return Err(e),
                        _ => (),
                    }
                }
                Ok(())
            });
            tokio::select! {
                result = finished => result??,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    println!("Interrupted, stopping.");
                    engine.stop();
                }
            }
        }
        Commands::Classify { config } => {
            let config = match config {
                Some(path) => Classifier::deserialize(&path)?,
                None => Classifier::default(),
            };

            let engine =
                Engine::connect(config.device())?.with_stop_timeout(config.stop_timeout()?);
            engine.set_tempo(config.tempo());
            let session = Session::new(
                engine,
                &config.midi_dir(),
                &config.progress_file(),
                &config.export_dir(),
            )?;
            println!("{}", session.status());

            let interrupted = Arc::new(AtomicBool::new(false));
            let shutdown = {
                let interrupted = interrupted.clone();
                async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => interrupted.store(true, Ordering::Relaxed),
                        Err(e) => {
                            warn!(err = %e, "Unable to listen for Ctrl-C.");
                            future::pending::<()>().await;
                        }
                    }
                }
            };
            Controller::with_shutdown(session, Arc::new(keyboard::Driver::new()), shutdown)
                .join()
                .await?;

            if interrupted.load(Ordering::Relaxed) {
                // The session is closed, but the keyboard driver is still blocked on stdin.
                process::exit(130);
            }
        }
    }

    Ok(())
}
