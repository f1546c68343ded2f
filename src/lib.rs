//! svcwatch - client-side telemetry engine for an internal service portal.
//!
//! The portal proxies backend services; this crate is the piece of the
//! client that records service-access telemetry and keeps the dashboard's
//! view of the world stable:
//!
//! - a durable per-profile identity token ([`identity`]);
//! - best-effort access recording when a service is opened ([`recorder`]);
//! - periodic heartbeats for the lifetime of the service window
//!   ([`heartbeat`]);
//! - window-close detection by polling, ending the session exactly once
//!   ([`watcher`], [`session`]);
//! - fixed-cadence status polling that retains stale snapshots over
//!   flickering to unknown ([`status`]);
//! - locally cached preferences merged into server records ([`prefs`]).
//!
//! Telemetry is advisory: every failure on these paths is logged and
//! converted to a typed fallback, never surfaced to the caller and never a
//! gate on the primary user action.

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod heartbeat;
pub mod identity;
pub mod prefs;
pub mod presence;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod status;
pub mod storage;
pub mod watcher;
pub mod window;
