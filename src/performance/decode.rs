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
    path::{Path, PathBuf},
    time::Duration,
};

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use super::{Performance, TimedEvent};

/// Microseconds per quarter note until the first tempo event.
const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Errors produced while turning a MIDI file into a performance.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("unsupported MIDI timing: {0}")]
    Timing(String),
}

/// Decodes the Standard MIDI File at the given path.
pub fn decode(path: &Path) -> Result<Performance, DecodeError> {
    let buf = fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let performance = decode_bytes(&buf)?;

    debug!(
        file = %path.display(),
        events = performance.len(),
        duration = ?performance.total_duration(),
        "Decoded MIDI file."
    );
    Ok(performance)
}

/// Decodes an in-memory Standard MIDI File.
pub fn decode_bytes(buf: &[u8]) -> Result<Performance, DecodeError> {
    let smf = Smf::parse(buf)?;
    from_smf(&smf)
}

/// What a merged track event turns into once it has been placed on the timeline.
#[derive(Clone, Copy)]
enum Payload {
    Note(TimedEvent),
    Tempo(u32),
    Other,
}

struct Stamped {
    tick: u64,
    payload: Payload,
}

/// Converts a parsed file into a single timeline of events with real-time delays.
fn from_smf(smf: &Smf) -> Result<Performance, DecodeError> {
    let (mut stamped, end_tick) = merge_tracks(smf);
    // Stable, so events on the same tick keep their track order.
    stamped.sort_by_key(|event| event.tick);

    let mut clock = Clock::new(smf.header.timing)?;
    let mut events = Vec::with_capacity(stamped.len() + 1);
    let mut last_elapsed = Duration::ZERO;

    let mut push = |clock: &Clock, event: TimedEvent| {
        let elapsed = clock.elapsed();
        let delay = elapsed.saturating_sub(last_elapsed);
        last_elapsed = elapsed;
        events.push(TimedEvent { delay, ..event });
    };

    let mut last_tick = 0;
    for Stamped { tick, payload } in stamped {
        clock.advance_to(tick);
        last_tick = tick;
        match payload {
            Payload::Note(event) => push(&clock, event),
            Payload::Tempo(micros) => {
                push(&clock, TimedEvent::other(Duration::ZERO));
                clock.set_tempo(micros);
            }
            Payload::Other => push(&clock, TimedEvent::other(Duration::ZERO)),
        }
    }

    if end_tick > last_tick {
        clock.advance_to(end_tick);
        push(&clock, TimedEvent::other(Duration::ZERO));
    }

    Ok(Performance::new(events))
}

/// Places every track event on an absolute tick timeline. Returns the events and the tick
/// of the latest end of track.
fn merge_tracks(smf: &Smf) -> (Vec<Stamped>, u64) {
    let mut stamped = Vec::new();
    let mut end_tick = 0;
    let mut offset = 0;

    for track in smf.tracks.iter() {
        let mut tick = offset;
        for event in track.iter() {
            tick += u64::from(event.delta.as_int());

            let payload = match event.kind {
                TrackEventKind::Midi { channel, message } => match message {
                    MidiMessage::NoteOn { key, vel } => Payload::Note(TimedEvent::note_on(
                        Duration::ZERO,
                        channel,
                        key,
                        vel,
                    )),
                    MidiMessage::NoteOff { key, vel } => Payload::Note(TimedEvent::note_off(
                        Duration::ZERO,
                        channel,
                        key,
                        vel,
                    )),
                    _ => Payload::Other,
                },
                TrackEventKind::Meta(MetaMessage::Tempo(micros)) => Payload::Tempo(micros.as_int()),
                // Folded into a single trailing event below.
                TrackEventKind::Meta(MetaMessage::EndOfTrack) => continue,
                _ => Payload::Other,
            };
            stamped.push(Stamped { tick, payload });
        }

        end_tick = end_tick.max(tick);
        if smf.header.format == Format::Sequential {
            offset = tick;
        }
    }

    (stamped, end_tick)
}

/// Converts absolute ticks into elapsed time, honoring tempo changes.
struct Clock {
    ticks_per_beat: Option<f64>,
    seconds_per_tick: f64,
    tick: u64,
    elapsed_secs: f64,
}

impl Clock {
    fn new(timing: Timing) -> Result<Clock, DecodeError> {
        match timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = f64::from(ticks_per_beat.as_int());
                if ticks_per_beat == 0.0 {
                    return Err(DecodeError::Timing(
                        "zero ticks per quarter note".to_string(),
                    ));
                }
                Ok(Clock {
                    ticks_per_beat: Some(ticks_per_beat),
                    seconds_per_tick: f64::from(DEFAULT_TEMPO_MICROS) / 1_000_000.0 / ticks_per_beat,
                    tick: 0,
                    elapsed_secs: 0.0,
                })
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframes);
                if ticks_per_second <= 0.0 {
                    return Err(DecodeError::Timing(format!(
                        "{} fps with {} subframes",
                        fps.as_f32(),
                        subframes
                    )));
                }
                Ok(Clock {
                    ticks_per_beat: None,
                    seconds_per_tick: 1.0 / ticks_per_second,
                    tick: 0,
                    elapsed_secs: 0.0,
                })
            }
        }
    }

    fn advance_to(&mut self, tick: u64) {
        let ticks = tick.saturating_sub(self.tick);
        self.elapsed_secs += ticks as f64 * self.seconds_per_tick;
        self.tick = self.tick.max(tick);
    }

    /// Tempo events are ignored for SMPTE timing, which has a fixed tick length.
    fn set_tempo(&mut self, micros_per_beat: u32) {
        if let Some(ticks_per_beat) = self.ticks_per_beat {
            self.seconds_per_tick = f64::from(micros_per_beat) / 1_000_000.0 / ticks_per_beat;
        }
    }

    fn elapsed(&self) -> Duration {
        Duration::from_nanos((self.elapsed_secs * 1_000_000_000.0).round() as u64)
    }
}

#[cfg(test)]
mod test {
    use std::{fs, time::Duration};

    use midly::{
        num::{u15, u24, u28},
        Format, Fps, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    };

    use super::{decode, decode_bytes, DecodeError};
    use crate::performance::EventKind;

    fn note(delta: u32, on: bool, channel: u8, key: u8) -> TrackEvent<'static> {
        let message = if on {
            MidiMessage::NoteOn {
                key: key.into(),
                vel: 100.into(),
            }
        } else {
            MidiMessage::NoteOff {
                key: key.into(),
                vel: 0.into(),
            }
        };
        TrackEvent {
            delta: u28::from(delta),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message,
            },
        }
    }

    fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::from(delta),
            kind: TrackEventKind::Meta(message),
        }
    }

    fn write(smf: &Smf) -> Vec<u8> {
        let mut buf = Vec::new();
        smf.write_std(&mut buf).expect("unable to write MIDI");
        buf
    }

    fn assert_close(expected_millis: u64, actual: Duration) {
        let expected = Duration::from_millis(expected_millis);
        let diff = if expected > actual {
            expected - actual
        } else {
            actual - expected
        };
        assert!(
            diff < Duration::from_micros(10),
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_decode_single_track_default_tempo() {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::from(480)),
        ));
        smf.tracks.push(vec![
            note(0, true, 0, 60),
            note(480, false, 0, 60),
            meta(240, MetaMessage::EndOfTrack),
        ]);

        let performance = decode_bytes(&write(&smf)).expect("decode failed");
        let events = performance.events();
        assert_eq!(3, events.len());
        assert_eq!(EventKind::NoteOn, events[0].kind());
        assert_eq!(Duration::ZERO, events[0].delay());
        assert_eq!(EventKind::NoteOff, events[1].kind());
        assert_close(500, events[1].delay());
        // The end of track marker keeps the trailing silence.
        assert_eq!(EventKind::Other, events[2].kind());
        assert_close(250, events[2].delay());
        assert_close(750, performance.total_duration());
    }

    #[test]
    fn test_decode_tempo_change() {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::from(100)),
        ));
        smf.tracks.push(vec![
            // 250ms per quarter note from the start.
            meta(0, MetaMessage::Tempo(u24::from(250_000))),
            note(100, true, 0, 60),
            // 1s per quarter note from here on.
            meta(0, MetaMessage::Tempo(u24::from(1_000_000))),
            note(50, false, 0, 60),
            meta(0, MetaMessage::EndOfTrack),
        ]);

        let performance = decode_bytes(&write(&smf)).expect("decode failed");
        let notes: Vec<_> = performance
            .events()
            .iter()
            .filter(|event| event.kind() != EventKind::Other)
            .collect();
        assert_eq!(2, notes.len());
        assert_close(750, performance.total_duration());
        assert_close(500, notes[1].delay());
    }

    #[test]
    fn test_decode_parallel_tracks_are_merged() {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::from(480)),
        ));
        smf.tracks.push(vec![
            meta(0, MetaMessage::Tempo(u24::from(500_000))),
            meta(960, MetaMessage::EndOfTrack),
        ]);
        smf.tracks.push(vec![
            note(240, true, 1, 64),
            note(240, false, 1, 64),
            meta(0, MetaMessage::EndOfTrack),
        ]);
        smf.tracks.push(vec![
            note(0, true, 2, 67),
            note(480, false, 2, 67),
            meta(0, MetaMessage::EndOfTrack),
        ]);

        let performance = decode_bytes(&write(&smf)).expect("decode failed");
        let notes: Vec<(u8, Duration)> = performance
            .events()
            .iter()
            .filter(|event| event.kind() != EventKind::Other)
            .map(|event| (event.channel().as_int(), event.delay()))
            .collect();

        assert_eq!(4, notes.len());
        assert_eq!(2, notes[0].0);
        assert_eq!(1, notes[1].0);
        // Both note offs land on the same tick; track order is preserved.
        assert_eq!(1, notes[2].0);
        assert_eq!(2, notes[3].0);
        assert_eq!(Duration::ZERO, notes[3].1);
        assert_close(1000, performance.total_duration());
    }

    #[test]
    fn test_decode_sequential_tracks_are_concatenated() {
        let mut smf = Smf::new(Header::new(
            Format::Sequential,
            Timing::Metrical(u15::from(480)),
        ));
        smf.tracks.push(vec![
            note(0, true, 0, 60),
            note(480, false, 0, 60),
            meta(0, MetaMessage::EndOfTrack),
        ]);
        smf.tracks.push(vec![
            note(0, true, 0, 62),
            note(480, false, 0, 62),
            meta(0, MetaMessage::EndOfTrack),
        ]);

        let performance = decode_bytes(&write(&smf)).expect("decode failed");
        assert_eq!(4, performance.note_event_count());
        assert_close(1000, performance.total_duration());
    }

    #[test]
    fn test_decode_timecode() {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Timecode(Fps::Fps25, 40),
        ));
        smf.tracks.push(vec![
            note(0, true, 0, 60),
            note(500, false, 0, 60),
            meta(0, MetaMessage::EndOfTrack),
        ]);

        let performance = decode_bytes(&write(&smf)).expect("decode failed");
        assert_close(500, performance.total_duration());
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let path = dir.path().join("melody.mid");

        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::from(96)),
        ));
        smf.tracks.push(vec![
            note(0, true, 0, 72),
            note(96, false, 0, 72),
            meta(0, MetaMessage::EndOfTrack),
        ]);
        fs::write(&path, write(&smf)).expect("unable to write file");

        let performance = decode(&path).expect("decode failed");
        assert_eq!(2, performance.note_event_count());
        assert_close(500, performance.total_duration());
    }

    #[test]
    fn test_decode_errors() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");

        let missing = decode(&dir.path().join("missing.mid"));
        assert!(matches!(missing, Err(DecodeError::Io { .. })));

        let garbage = decode_bytes(b"definitely not a MIDI file");
        assert!(matches!(garbage, Err(DecodeError::Parse(_))));
    }
}
