//! Services layer (ports + adapters).
//!
//! - `ports`: pure contracts/types used across the app (kernel-facing).
//! - `adapters`: in-memory and host-backed implementations (IO/async).

pub mod adapters;
pub mod host;
pub mod ports;

pub use host::SessionContext;
