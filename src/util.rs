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
use std::path::Path;
use std::time::Duration;

use duration_string::DurationString;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Outputs the given duration in a minutes:seconds.millis format.
pub fn duration_display(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() % 60;
    format!("{}:{:02}.{:03}", minutes, secs, duration.subsec_millis())
}

/// Parses a duration given either as plain (fractional) seconds, e.g. `1.5`, or in
/// duration-string syntax, e.g. `1500ms`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", input, e));
    }

    DurationString::from_string(input.to_string())
        .map(Duration::from)
        .map_err(|e| format!("{}: {}", input, e))
}

#[cfg(test)]
mod test {
    use std::{path::Path, time::Duration};

    use super::{duration_display, filename_display, parse_duration};

    #[test]
    fn test_duration_display() {
        assert_eq!("0:00.000", duration_display(Duration::ZERO));
        assert_eq!("0:05.250", duration_display(Duration::from_millis(5250)));
        assert_eq!("1:00.000", duration_display(Duration::from_secs(60)));
        assert_eq!("60:06.001", duration_display(Duration::from_millis(3_606_001)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(Ok(Duration::from_millis(1500)), parse_duration("1.5"));
        assert_eq!(Ok(Duration::from_secs(2)), parse_duration(" 2 "));
        assert_eq!(Ok(Duration::from_millis(250)), parse_duration("250ms"));
        assert_eq!(Ok(Duration::from_secs(3)), parse_duration("3s"));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("song.mid", filename_display(Path::new("midi_files/song.mid")));
    }
}
