//! # Altimeter Sync Library
//!
//! Store-and-forward telemetry for a barometric altimeter on an intermittent
//! network link.
//!
//! Readings are uploaded while the link is up. While it is down they are
//! archived as sequence-numbered files in a [`store::RecordStore`], and the
//! backlog is drained in one batch request once the link returns.

pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod record;
pub mod reference;
pub mod sensor;
pub mod state;
pub mod store;
pub mod sync;
pub mod uplink;
