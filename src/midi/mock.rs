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
use std::{fmt, sync::Arc, time::Instant};

use midly::{live::LiveEvent, num::u4, MidiMessage};
use parking_lot::Mutex;

use super::DispatchError;

/// A message recorded by the mock device.
#[derive(Clone, Copy, Debug)]
pub struct Sent {
    pub at: Instant,
    pub channel: u4,
    pub message: MidiMessage,
}

impl Sent {
    /// True for a note off with velocity zero, which is what the notes off sweep emits.
    pub fn is_silent_note_off(&self) -> bool {
        matches!(self.message, MidiMessage::NoteOff { vel, .. } if vel.as_int() == 0)
    }
}

#[derive(Default)]
struct State {
    sent: Vec<Sent>,
    attempts: usize,
    fail_after: Option<usize>,
    closed: bool,
    close_calls: usize,
}

/// A mock device. Doesn't actually play anything, but records everything sent to it.
/// Clones share the same recording, so a test can keep a clone while the engine owns
/// the original.
#[derive(Clone)]
pub struct Device {
    name: String,
    state: Arc<Mutex<State>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// All messages successfully sent so far, in order.
    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }

    /// Messages sent so far, excluding the silent note offs of a notes off sweep.
    pub fn played(&self) -> Vec<Sent> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|sent| !sent.is_silent_note_off())
            .copied()
            .collect()
    }

    /// The number of calls to send, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Makes every send fail once the given number of messages have been sent.
    pub fn fail_after(&self, successful_sends: usize) {
        self.state.lock().fail_after = Some(successful_sends);
    }

    /// Forgets all recorded messages and attempts.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.sent.clear();
        state.attempts = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// The number of times close has been called.
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

impl super::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, event: LiveEvent<'_>) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if state.closed {
            return Err(DispatchError::Closed(self.name.clone()));
        }
        if state
            .fail_after
            .is_some_and(|fail_after| state.sent.len() >= fail_after)
        {
            return Err(DispatchError::Disconnected(self.name.clone()));
        }

        if let LiveEvent::Midi { channel, message } = event {
            state.sent.push(Sent {
                at: Instant::now(),
                channel,
                message,
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use midly::{live::LiveEvent, MidiMessage};

    use crate::midi::{Device as _, DispatchError};

    use super::Device;

    fn note_on(key: u8) -> LiveEvent<'static> {
        LiveEvent::Midi {
            channel: 0.into(),
            message: MidiMessage::NoteOn {
                key: key.into(),
                vel: 90.into(),
            },
        }
    }

    #[test]
    fn test_records_and_shares_between_clones() {
        let observer = Device::get("mock-device");
        let mut device = observer.clone();

        device.send(note_on(60)).expect("send failed");
        device.send(note_on(62)).expect("send failed");

        let sent = observer.sent();
        assert_eq!(2, sent.len());
        assert_eq!(
            MidiMessage::NoteOn {
                key: 62.into(),
                vel: 90.into()
            },
            sent[1].message
        );
        assert_eq!(2, observer.played().len());

        observer.clear();
        assert!(observer.sent().is_empty());
        assert_eq!(0, observer.attempts());
    }

    #[test]
    fn test_fail_after() {
        let observer = Device::get("mock-device");
        let mut device = observer.clone();
        observer.fail_after(1);

        assert!(device.send(note_on(60)).is_ok());
        assert!(matches!(
            device.send(note_on(61)),
            Err(DispatchError::Disconnected(_))
        ));
        assert_eq!(1, observer.sent().len());
        assert_eq!(2, observer.attempts());
    }

    #[test]
    fn test_close_is_idempotent() {
        let observer = Device::get("mock-device");
        let mut device = observer.clone();

        device.close();
        device.close();
        assert!(observer.is_closed());
        assert_eq!(2, observer.close_calls());
        assert!(matches!(
            device.send(note_on(60)),
            Err(DispatchError::Closed(_))
        ));
    }
}
