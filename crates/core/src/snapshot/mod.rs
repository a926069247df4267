//! Local identity snapshots.
//!
//! The remote side of the comparison is fetched by
//! [`DirectoryClient`](crate::directory::DirectoryClient).

pub mod local;
pub mod membership;

pub use local::load_local_snapshot;
pub use membership::MembershipView;
