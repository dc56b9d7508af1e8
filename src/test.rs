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
    fs, io,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use midly::{
    num::{u15, u28},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    let tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(5);

    loop {
        if predicate() {
            return;
        }
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        thread::sleep(tick);
    }
}

/// Writes a single track MIDI file playing the given keys one after another, each held
/// for 48 ticks at 480 ticks per beat and the default tempo, i.e. 50ms.
pub fn write_midi(path: &Path, keys: &[u8]) -> Result<(), io::Error> {
    let mut track = Vec::new();
    for key in keys {
        for (delta, message) in [
            (
                0u32,
                MidiMessage::NoteOn {
                    key: (*key).into(),
                    vel: 100.into(),
                },
            ),
            (
                48,
                MidiMessage::NoteOff {
                    key: (*key).into(),
                    vel: 64.into(),
                },
            ),
        ] {
            track.push(TrackEvent {
                delta: u28::from(delta),
                kind: TrackEventKind::Midi {
                    channel: 0.into(),
                    message,
                },
            });
        }
    }
    track.push(TrackEvent {
        delta: u28::from(0u32),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::from(480))),
        tracks: vec![track],
    };
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    fs::write(path, buf)
}
