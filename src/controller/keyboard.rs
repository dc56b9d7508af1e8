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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::{session::Category, util::parse_duration};

const PLAY: &str = "play";
const STOP: &str = "stop";
const TOGGLE: &str = "toggle";
const SPACE: &str = "space";
const LOOP: &str = "loop";
const LOOP_POINTS: &str = "loop-points";
const LOOP_CLEAR: &str = "loop-clear";
const TEMPO: &str = "tempo";
const NEXT: &str = "next";
const PREV: &str = "prev";
const COMMENT: &str = "comment";
const STATS: &str = "stats";
const STATUS: &str = "status";
const EXPORT: &str = "export";
const REFRESH: &str = "refresh";
const QUIT: &str = "quit";

/// A controller that drives a session from lines typed on the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and forwards one command. Returns false once input is exhausted or the user
    /// quit.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} [secs], {}, {}, {}, {} <start> <end>, {}, {} <x>, {}, {}, 0-8, {} <text>, {}, {}, {}, {}, {}): ",
            PLAY, STOP, SPACE, LOOP, LOOP_POINTS, LOOP_CLEAR, TEMPO, NEXT, PREV, COMMENT, STATS,
            STATUS, EXPORT, REFRESH, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        let event = match parse(&input) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(true),
            Err(e) => {
                warn!(input = input.trim(), err = %e, "Unrecognized input");
                return Ok(true);
            }
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(!quit)
    }
}

/// Parses a command line into an event. Empty lines produce nothing, a line of only
/// spaces toggles playback.
fn parse(input: &str) -> Result<Option<Event>, String> {
    let line = input.trim_end_matches(['\r', '\n']);
    if !line.is_empty() && line.trim().is_empty() {
        return Ok(Some(Event::TogglePlayback));
    }
    let input = line.trim();
    let (command, args) = match input.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (input, ""),
    };
    let command = command.to_lowercase();

    let event = match command.as_str() {
        "" => return Ok(None),
        PLAY if args.is_empty() => Event::Play(None),
        PLAY => Event::Play(Some(parse_duration(args)?)),
        STOP => Event::Stop,
        SPACE | TOGGLE => Event::TogglePlayback,
        LOOP => Event::ToggleLoop,
        LOOP_POINTS => match args.split_whitespace().collect::<Vec<_>>().as_slice() {
            [start, end] => Event::LoopPoints {
                start: parse_duration(start)?,
                end: parse_duration(end)?,
            },
            _ => return Err(format!("{} needs a start and an end", LOOP_POINTS)),
        },
        LOOP_CLEAR => Event::ClearLoopPoints,
        TEMPO => Event::Tempo(
            args.parse::<f64>()
                .map_err(|e| format!("bad tempo {}: {}", args, e))?,
        ),
        NEXT => Event::Next,
        PREV => Event::Prev,
        COMMENT => Event::Comment(args.to_string()),
        STATS => Event::Stats,
        STATUS => Event::Status,
        EXPORT => Event::Export,
        REFRESH => Event::Refresh,
        QUIT => Event::Quit,
        other => match other.parse::<u8>() {
            Ok(number) => Event::Classify(
                Category::from_number(number)
                    .ok_or_else(|| format!("no category {}", number))?,
            ),
            Err(_) => Event::Classify(other.parse::<Category>()?),
        },
    };
    Ok(Some(event))
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
