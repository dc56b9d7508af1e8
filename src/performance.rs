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
use std::{fmt, time::Duration};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};

use crate::util::duration_display;

mod decode;

pub use decode::{decode, decode_bytes, DecodeError};

/// The payload type of a timed event. Only note events are ever dispatched to a device;
/// everything else only contributes its delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Other,
}

/// A single event of a performance, carrying its delay relative to the previous event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    delay: Duration,
    kind: EventKind,
    channel: u4,
    note: u7,
    velocity: u7,
}

impl TimedEvent {
    /// Creates a note on event.
    pub fn note_on(delay: Duration, channel: u4, note: u7, velocity: u7) -> TimedEvent {
        TimedEvent {
            delay,
            kind: EventKind::NoteOn,
            channel,
            note,
            velocity,
        }
    }

    /// Creates a note off event.
    pub fn note_off(delay: Duration, channel: u4, note: u7, velocity: u7) -> TimedEvent {
        TimedEvent {
            delay,
            kind: EventKind::NoteOff,
            channel,
            note,
            velocity,
        }
    }

    /// Creates an event that only carries timing (meta events, controllers, sysex, ...).
    pub fn other(delay: Duration) -> TimedEvent {
        TimedEvent {
            delay,
            kind: EventKind::Other,
            channel: u4::from(0),
            note: u7::from(0),
            velocity: u7::from(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn channel(&self) -> u4 {
        self.channel
    }

    pub fn note(&self) -> u7 {
        self.note
    }

    pub fn velocity(&self) -> u7 {
        self.velocity
    }

    /// Returns the live MIDI event to send to a device, or none if this event is not
    /// forwarded.
    pub fn live_event(&self) -> Option<LiveEvent<'static>> {
        let message = match self.kind {
            EventKind::NoteOn => MidiMessage::NoteOn {
                key: self.note,
                vel: self.velocity,
            },
            EventKind::NoteOff => MidiMessage::NoteOff {
                key: self.note,
                vel: self.velocity,
            },
            EventKind::Other => return None,
        };

        Some(LiveEvent::Midi {
            channel: self.channel,
            message,
        })
    }
}

/// A decoded, immutable sequence of timed events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Performance {
    events: Vec<TimedEvent>,
    total_duration: Duration,
}

impl Performance {
    /// Creates a performance from an ordered list of events.
    pub fn new(events: Vec<TimedEvent>) -> Performance {
        let total_duration = events
            .iter()
            .fold(Duration::ZERO, |total, event| total.saturating_add(event.delay));
        Performance {
            events,
            total_duration,
        }
    }

    /// A performance with no events and no duration.
    pub fn empty() -> Performance {
        Performance::default()
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// The sum of all event delays.
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of note on/off events, i.e. the events that will reach the device.
    pub fn note_event_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.kind != EventKind::Other)
            .count()
    }
}

impl fmt::Display for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} notes), duration {}",
            self.len(),
            self.note_event_count(),
            duration_display(self.total_duration)
        )
    }
}
