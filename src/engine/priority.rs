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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, warn};

/// Environment variable overriding the scheduling thread priority (0-99).
const THREAD_PRIORITY_ENV: &str = "MIDISIFT_THREAD_PRIORITY";

/// Default priority for the scheduling thread when the environment variable is unset.
const DEFAULT_SCHEDULER_THREAD_PRIORITY: u8 = 60;

/// Reads the configured scheduling thread priority, falling back to the default when the
/// environment variable is unset or invalid.
pub(super) fn scheduler_thread_priority() -> u8 {
    parse_priority(std::env::var(THREAD_PRIORITY_ENV).ok().as_deref())
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_SCHEDULER_THREAD_PRIORITY)
}

/// Raises the priority of the calling thread. Failures are logged and ignored.
pub(super) fn raise_current_thread(priority: u8) {
    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            warn!(priority, err = ?e, "Invalid scheduling thread priority.");
            return;
        }
    };

    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => debug!(priority, "Raised scheduling thread priority."),
        Err(e) => debug!(
            priority,
            err = ?e,
            "Unable to raise scheduling thread priority."
        ),
    }
}

#[cfg(test)]
mod test {
    use super::{parse_priority, DEFAULT_SCHEDULER_THREAD_PRIORITY};

    #[test]
    fn test_parse_priority() {
        assert_eq!(DEFAULT_SCHEDULER_THREAD_PRIORITY, parse_priority(None));
        assert_eq!(10, parse_priority(Some("10")));
        assert_eq!(99, parse_priority(Some(" 99 ")));
        assert_eq!(DEFAULT_SCHEDULER_THREAD_PRIORITY, parse_priority(Some("100")));
        assert_eq!(DEFAULT_SCHEDULER_THREAD_PRIORITY, parse_priority(Some("high")));
    }
}
