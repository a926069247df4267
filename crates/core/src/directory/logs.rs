//! Log sources exposed by the directory API.
//!
//! The event, LDAP and RADIUS logs share one paging protocol but carry
//! different fields. Entries are kept as a timestamp plus a free-form field
//! map; [`LogSource::columns`] names the fields shown and exported for each
//! source.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Directory change and admin events.
    #[default]
    Event,
    /// LDAP bind attempts.
    Ldap,
    /// RADIUS authentication attempts.
    Radius,
}

impl LogSource {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Event => "logs/event/",
            Self::Ldap => "logs/ldap/",
            Self::Radius => "logs/radius/",
        }
    }

    /// `(header, field)` pairs for table and CSV output.
    pub fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Event => &[
                ("TIMESTAMP (UTC)", "timestamp"),
                ("EVENT_TYPE", "event_type"),
                ("DATA", "data"),
            ],
            Self::Ldap => &[
                ("TIMESTAMP (UTC)", "timestamp"),
                ("BIND_DN", "bindDn"),
                ("TYPE", "type"),
                ("SUCCESS", "success"),
                ("MESSAGE", "message"),
            ],
            Self::Radius => &[
                ("TIMESTAMP (UTC)", "timestamp"),
                ("USERNAME", "username"),
                ("IP ADDRESS", "ipAddress"),
                ("MESSAGE", "message"),
                ("SUCCESS", "success"),
            ],
        }
    }
}

impl FromStr for LogSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "ldap" => Ok(Self::Ldap),
            "radius" => Ok(Self::Radius),
            other => Err(format!("unknown log source '{}' (use event, ldap, radius)", other)),
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Ldap => write!(f, "ldap"),
            Self::Radius => write!(f, "radius"),
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    /// Render the value at a dotted field path. `None` when the path is
    /// missing or null.
    pub fn field(&self, path: &str) -> Option<String> {
        if path == "timestamp" {
            return Some(self.timestamp.clone());
        }
        let mut keys = path.split('.');
        let mut current = self.fields.get(keys.next()?)?;
        for key in keys {
            current = current.get(key)?;
        }
        scalar_to_string(current)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Write `entries` as CSV with the source's column headers.
pub fn write_csv<W: io::Write>(source: LogSource, entries: &[&LogEntry], out: W) -> Result<(), csv::Error> {
    let columns = source.columns();
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(columns.iter().map(|(header, _)| *header))?;
    for entry in entries {
        wtr.write_record(
            columns
                .iter()
                .map(|(_, field)| entry.field(field).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}
