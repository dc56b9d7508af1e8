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
use std::fmt;

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use midly::live::LiveEvent;
use tracing::{debug, info, span, Level};

use super::{encode, DeviceError, DispatchError};

/// An output port bound through midir.
pub struct Device {
    name: String,
    connection: Option<MidiOutputConnection>,
}

impl super::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, event: LiveEvent<'_>) -> Result<(), DispatchError> {
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return Err(DispatchError::Closed(self.name.clone())),
        };

        let buf = encode(&event)?;
        connection.send(&buf)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!(device = self.name, "Closing MIDI output.");
            connection.close();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        super::Device::close(self);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connection.is_some() {
            "Output"
        } else {
            "Closed"
        };
        write!(f, "{} ({})", self.name, state)
    }
}

/// Lists the output ports known to midir, sorted by name.
pub fn list() -> Result<Vec<String>, DeviceError> {
    let output = MidiOutput::new("midisift output listing")?;
    Ok(list_ports(&output)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

fn list_ports(output: &MidiOutput) -> Result<Vec<(String, MidiOutputPort)>, DeviceError> {
    let mut ports = output
        .ports()
        .into_iter()
        .map(|port| Ok((output.port_name(&port)?, port)))
        .collect::<Result<Vec<(String, MidiOutputPort)>, DeviceError>>()?;
    ports.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(ports)
}

/// Binds to the given output port, or the first one if no name is given.
pub fn get(name: Option<&str>) -> Result<Device, DeviceError> {
    let span = span!(Level::INFO, "bind output (midir)");
    let _enter = span.enter();

    let output = MidiOutput::new("midisift output")?;
    let ports = list_ports(&output)?;
    if ports.is_empty() {
        return Err(DeviceError::NoOutputDevice);
    }

    let mut matches = match name {
        Some(name) => ports
            .into_iter()
            .filter(|(port_name, _)| port_name.contains(name))
            .collect::<Vec<(String, MidiOutputPort)>>(),
        None => ports.into_iter().take(1).collect(),
    };

    if matches.is_empty() {
        return Err(DeviceError::NotFound(name.unwrap_or_default().to_string()));
    }
    if matches.len() > 1 {
        return Err(DeviceError::Ambiguous {
            name: name.unwrap_or_default().to_string(),
            matches: matches
                .iter()
                .map(|(port_name, _)| port_name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        });
    }

    // We've verified that there's only one element in the vector, so this is safe.
    let (port_name, port) = matches.swap_remove(0);
    debug!(device = port_name, "Connecting to MIDI output.");
    let connection =
        output
            .connect(&port, "midisift playback")
            .map_err(|e| DeviceError::Connect {
                name: port_name.clone(),
                reason: e.to_string(),
            })?;

    info!(device = port_name, "Using MIDI output.");
    Ok(Device {
        name: port_name,
        connection: Some(connection),
    })
}
