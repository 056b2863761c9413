//! Outbound request policy for Rookery tools.
//!
//! Provides:
//! - **Allowlist**: exact-hostname allowlisting for `fetch_url`
//! - **Network guard**: rejection of loopback, private, link-local and other
//!   internal address ranges, both literal and after DNS resolution

pub mod allowlist;
pub mod network;

pub use allowlist::HostAllowlist;
pub use network::{is_restricted_ip, resolve_and_check};
