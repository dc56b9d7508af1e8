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
use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

/// Represents the current cancel state.
#[derive(Clone, Copy, PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared between the engine and its scheduling thread. The scheduling
/// thread is responsible for respecting a cancel request between and during its waits.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    /// Set to cancelled once the owner asks the scheduling thread to stop.
    state: Mutex<CancelState>,
    /// Wakes up any waiter when the state changes.
    condvar: Condvar,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            inner: Arc::new(Inner {
                state: Mutex::new(CancelState::Untouched),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns true if the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.lock() == CancelState::Cancelled
    }

    /// Sleeps for the given duration unless the handle is cancelled first. Returns true if
    /// the sleep was cut short by a cancellation (or the handle was already cancelled).
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if *state == CancelState::Cancelled {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        self.inner.condvar.wait_while_for(
            &mut state,
            |state| *state == CancelState::Untouched,
            duration,
        );
        *state == CancelState::Cancelled
    }

    /// Cancels the handle and wakes up any sleeper.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if *state == CancelState::Untouched {
            *state = CancelState::Cancelled;
            self.inner.condvar.notify_all();
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}
