//! Remote directory API access: user/group listings and logs.

pub mod client;
pub mod filter;
pub mod logs;

pub use client::DirectoryClient;
pub use filter::{FilterOp, LogFilter};
pub use logs::{write_csv, LogEntry, LogSource};
