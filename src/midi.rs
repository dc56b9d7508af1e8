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
use std::{fmt, io};

use midly::live::LiveEvent;

mod midir;
pub mod mock;

/// Errors raised while finding or binding an output device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no MIDI output ports found, please connect a MIDI device")]
    NoOutputDevice,

    #[error("no device found with name {0}")]
    NotFound(String),

    #[error("found too many devices that match {name} ({matches}), use a less ambiguous device name")]
    Ambiguous { name: String, matches: String },

    #[error("unable to initialize MIDI output: {0}")]
    Init(#[from] ::midir::InitError),

    #[error("unable to read MIDI port information: {0}")]
    PortInfo(#[from] ::midir::PortInfoError),

    #[error("unable to connect to {name}: {reason}")]
    Connect { name: String, reason: String },
}

/// Errors raised while sending a single event to a bound device.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("device {0} is closed")]
    Closed(String),

    #[error("device {0} is disconnected")]
    Disconnected(String),

    #[error("unable to encode MIDI event: {0}")]
    Encode(#[from] io::Error),

    #[error("unable to send MIDI event: {0}")]
    Send(#[from] ::midir::SendError),
}

/// A MIDI output device that events can be dispatched to.
pub trait Device: fmt::Display + Send {
    /// Returns the name of the device.
    fn name(&self) -> &str;

    /// Sends the event to the device immediately.
    fn send(&mut self, event: LiveEvent<'_>) -> Result<(), DispatchError>;

    /// Releases the device. Calling this more than once is a no-op.
    fn close(&mut self);
}

/// Lists the names of the available output ports, sorted. Fails if there are none.
pub fn enumerate() -> Result<Vec<String>, DeviceError> {
    let names = midir::list()?;
    if names.is_empty() {
        return Err(DeviceError::NoOutputDevice);
    }
    Ok(names)
}

/// Binds to an output device. With no name, the first available port is used. Names
/// starting with "mock" produce a mock device.
pub fn get_device(name: Option<&str>) -> Result<Box<dyn Device>, DeviceError> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Box::new(mock::Device::get(name)));
        }
    }

    Ok(Box::new(midir::get(name)?))
}

/// Serializes a live event into its wire representation.
pub(crate) fn encode(event: &LiveEvent<'_>) -> Result<Vec<u8>, DispatchError> {
    let mut buf: Vec<u8> = Vec::with_capacity(3);
    event.write_std(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod test {
    use midly::{live::LiveEvent, MidiMessage};

    use super::{encode, get_device};

    #[test]
    fn test_encode_note_events() {
        let note_on = LiveEvent::Midi {
            channel: 2.into(),
            message: MidiMessage::NoteOn {
                key: 60.into(),
                vel: 100.into(),
            },
        };
        assert_eq!(vec![0x92, 60, 100], encode(&note_on).expect("encode failed"));

        let note_off = LiveEvent::Midi {
            channel: 15.into(),
            message: MidiMessage::NoteOff {
                key: 127.into(),
                vel: 0.into(),
            },
        };
        assert_eq!(vec![0x8F, 127, 0], encode(&note_off).expect("encode failed"));
    }

    #[test]
    fn test_get_mock_device() {
        let device = get_device(Some("mock-output")).expect("expected mock device");
        assert_eq!("mock-output", device.name());
        assert_eq!("mock-output (Mock)", device.to_string());
    }
}
