//! Device-name mapping file
//!
//! One device per line: `<serial> <display-name>`, whitespace separated.
//! Lines that do not split into exactly two tokens are skipped.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::bridge::DeviceHandle;

/// Serial-to-name mapping, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNames {
    entries: Vec<(String, String)>,
}

impl DeviceNames {
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match tokens.as_slice() {
                    [serial, name] => Some((serial.to_string(), name.to_string())),
                    [] => None,
                    _ => {
                        debug!("Skipping malformed device line: {:?}", line);
                        None
                    }
                }
            })
            .collect();

        Self { entries }
    }

    /// Load the mapping file; a missing file yields an empty mapping
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Device name file {} not found", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn name_for(&self, serial: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == serial)
            .map(|(_, name)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, n)| (s.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pair mapped, attached devices with consecutive local ports
///
/// Walks the mapping in file order, keeps serials that are attached, names
/// the handle after the mapping and hands out ports from `base_port`
/// upward. Each session needs its own port.
pub fn plan_sessions(
    attached: &[DeviceHandle],
    names: &DeviceNames,
    base_port: u16,
) -> Vec<(DeviceHandle, u16)> {
    let mut port = base_port;
    let mut planned = Vec::new();

    for (serial, name) in names.iter() {
        let Some(device) = attached.iter().find(|d| d.serial == serial) else {
            debug!("Mapped device {} is not attached", serial);
            continue;
        };

        let mut device = device.clone();
        device.name = Some(name.to_string());
        planned.push((device, port));

        match port.checked_add(1) {
            Some(next) => port = next,
            None => break,
        }
    }

    planned
}
