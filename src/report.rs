//! Report assembly: join CLI dispatch results onto the device listing,
//! order the rows, and export them as CSV.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::path::Path;

pub const TELNET_UNKNOWN: &str = "Unknown";
pub const TELNET_DISABLED: &str = "Disabled";
pub const TELNET_ENABLED: &str = "Enabled - hive <name> manage telnet";

pub const NO_LOCATION: &str = "No Location";
pub const NO_FLOOR: &str = "No Floor";

pub const CSV_HEADER: [&str; 8] = [
    "HOSTNAME", "STATUS", "BUILDING", "FLOOR", "IP", "POLICY", "MODEL", "TELNET ENABLED",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn label(self) -> &'static str {
        match self {
            Connectivity::Online => "Online",
            Connectivity::Offline => "Offline",
        }
    }

    /// Value for the `connected` query parameter of the device listing.
    pub fn connected_param(self) -> &'static str {
        match self {
            Connectivity::Online => "true",
            Connectivity::Offline => "false",
        }
    }
}

/// One managed device, normalized from the API response. The id is internal
/// and never reaches the final CSV.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: u64,
    pub hostname: String,
    pub status: Connectivity,
    pub building: String,
    pub floor: String,
    pub ip: String,
    pub policy: String,
    pub model: String,
    pub telnet: String,
}

impl DeviceRecord {
    pub fn columns(&self) -> [&str; 8] {
        [
            &self.hostname,
            self.status.label(),
            &self.building,
            &self.floor,
            &self.ip,
            &self.policy,
            &self.model,
            &self.telnet,
        ]
    }
}

/// Telnet classification for one dispatched device.
#[derive(Debug, Clone)]
pub struct CliResult {
    pub id: u64,
    pub telnet: String,
}

/// Overwrite the telnet status of each online record with its dispatch
/// result. Every result id must match exactly one online record; anything
/// left over means the controller answered for a device we never listed.
pub fn apply_results(online: &mut [DeviceRecord], results: &[CliResult]) -> Result<()> {
    let mut by_id: HashMap<u64, &str> = results
        .iter()
        .map(|r| (r.id, r.telnet.as_str()))
        .collect();

    for record in online.iter_mut() {
        if let Some(telnet) = by_id.remove(&record.id) {
            record.telnet = telnet.to_string();
        }
    }

    if !by_id.is_empty() {
        let mut leftover: Vec<String> = by_id.keys().map(|id| id.to_string()).collect();
        leftover.sort();
        bail!(
            "CLI output returned for device id(s) not present in the online listing: {}",
            leftover.join(", ")
        );
    }

    Ok(())
}

/// Order the online rows and append the offline ones (when gathered).
///
/// Online rows sort by telnet status string, descending. That is plain
/// lexicographic ordering, kept for compatibility with the existing report:
/// it puts "Enabled - ..." above "Disabled", which is all consumers rely on.
pub fn build(mut online: Vec<DeviceRecord>, offline: Option<Vec<DeviceRecord>>) -> Vec<DeviceRecord> {
    online.sort_by(|a, b| b.telnet.cmp(&a.telnet));
    if let Some(offline) = offline {
        online.extend(offline);
    }
    online
}

pub fn write_csv(path: &Path, rows: &[DeviceRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record(row.columns())?;
    }
    writer.flush()?;
    Ok(())
}
