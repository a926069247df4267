//! Typed predicates over event log entries.
//!
//! A filter is written on the command line as `FIELD:OP:VALUE`, for example
//! `event_type:eq:login`, `data.user:contains:ali` or `success:is:false`.
//! `FIELD` is a dotted path into the entry. A path that does not resolve at
//! the top level is retried under `data`, so `user` also finds `data.user`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::logs::LogEntry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    /// Boolean comparison: `true`/`false`, `1`/`0`, `yes`/`no`.
    Is,
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "contains" => Ok(Self::Contains),
            "is" => Ok(Self::Is),
            other => Err(format!(
                "unknown filter operator '{}' (use eq, ne, contains, is)",
                other
            )),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "eq"),
            Self::Ne => write!(f, "ne"),
            Self::Contains => write!(f, "contains"),
            Self::Is => write!(f, "is"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl LogFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for `event_type:eq:<value>`.
    pub fn event_type(value: impl Into<String>) -> Self {
        Self::new("event_type", FilterOp::Eq, value)
    }

    /// Shorthand for `success:is:<outcome>`.
    pub fn outcome(success: bool) -> Self {
        Self::new("success", FilterOp::Is, success.to_string())
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        let actual = entry
            .field(&self.field)
            .or_else(|| entry.field(&format!("data.{}", self.field)));
        match self.op {
            FilterOp::Eq => actual.as_deref() == Some(self.value.as_str()),
            FilterOp::Ne => actual.as_deref() != Some(self.value.as_str()),
            FilterOp::Contains => actual.is_some_and(|a| a.contains(&self.value)),
            FilterOp::Is => match (actual.as_deref().and_then(truthiness), truthiness(&self.value)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl FromStr for LogFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("filter '{}' must look like FIELD:OP:VALUE", s));
        };
        if field.is_empty() {
            return Err(format!("filter '{}' has an empty field", s));
        }
        let op: FilterOp = op.parse()?;
        if op == FilterOp::Is && truthiness(value).is_none() {
            return Err(format!("filter '{}' needs a boolean value", s));
        }
        Ok(Self::new(field, op, value))
    }
}

impl fmt::Display for LogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.field, self.op, self.value)
    }
}

/// True when every filter matches. An empty slice matches everything.
pub fn matches_all(filters: &[LogFilter], entry: &LogEntry) -> bool {
    filters.iter().all(|f| f.matches(entry))
}

fn truthiness(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> LogEntry {
        serde_json::from_value(json!({
            "timestamp": "2026-10-01T10:00Z",
            "event_type": "login",
            "data": {"user": "alice", "host": {"name": "web-1", "port": 22}}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_filter() {
        let filter: LogFilter = "data.host.name:eq:web-1".parse().unwrap();
        assert_eq!(filter.field, "data.host.name");
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.to_string(), "data.host.name:eq:web-1");

        // Values may contain the separator.
        let filter: LogFilter = "timestamp:contains:10:00".parse().unwrap();
        assert_eq!(filter.value, "10:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("event_type".parse::<LogFilter>().is_err());
        assert!("event_type:like:x".parse::<LogFilter>().is_err());
        assert!(":eq:x".parse::<LogFilter>().is_err());
        assert!("success:is:maybe".parse::<LogFilter>().is_err());
    }

    #[test]
    fn test_matches() {
        let e = entry();
        assert!(LogFilter::event_type("login").matches(&e));
        assert!(!LogFilter::event_type("logout").matches(&e));
        assert!(LogFilter::new("user", FilterOp::Contains, "lic").matches(&e));
        assert!(LogFilter::new("data.host.port", FilterOp::Eq, "22").matches(&e));
        assert!(LogFilter::new("data.missing", FilterOp::Ne, "x").matches(&e));
        assert!(!LogFilter::new("data.missing", FilterOp::Contains, "").matches(&e));
    }

    #[test]
    fn test_matches_all() {
        let e = entry();
        assert!(matches_all(&[], &e));
        let filters = vec![
            LogFilter::event_type("login"),
            LogFilter::new("user", FilterOp::Eq, "bob"),
        ];
        assert!(!matches_all(&filters, &e));
    }

    #[test]
    fn test_outcome_matches_numeric_and_bool() {
        let ldap: LogEntry = serde_json::from_value(json!({
            "timestamp": "t", "bindDn": "cn=svc", "success": 1
        }))
        .unwrap();
        let radius: LogEntry = serde_json::from_value(json!({
            "timestamp": "t", "username": "bob", "success": false
        }))
        .unwrap();

        assert!(LogFilter::outcome(true).matches(&ldap));
        assert!(!LogFilter::outcome(false).matches(&ldap));
        assert!(LogFilter::outcome(false).matches(&radius));
        assert!(!LogFilter::outcome(true).matches(&entry()));
        assert!(LogFilter::new("bindDn", FilterOp::Eq, "cn=svc").matches(&ldap));
    }
}
