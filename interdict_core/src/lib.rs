//! Interdict Core - real-time alerting over ANPR vehicle identifications
//!
//! Every identified vehicle is fanned out to three independent checks:
//! 1. **Watchlist**: is this a vehicle under investigation? Broadcast to control.
//! 2. **Intercept**: is a violation vehicle near an officer who can reach it?
//!    Push to that officer.
//! 3. **Re-identification**: has this plate crossed several cameras? Broadcast
//!    the journey.
//!
//! Components share one [`SightingStore`] and publish through an
//! [`EventSink`], normally a [`DispatchHandle`] feeding the
//! [`EventDispatcher`] loop on the context that owns live channels.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod geo_math;
pub mod model;
pub mod pipeline;
pub mod proximity;
pub mod reid;
pub mod sled_store;
pub mod store;
pub mod watchlist;

// Re-export key types for convenience
pub use config::{DispatchConfig, InterdictConfig, ProximityConfig, ReIdConfig};
pub use dispatch::{
    ChannelRegistry, DispatchHandle, DispatchMonitor, DispatchStats, EventDispatcher, EventSink,
};
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::AlertEvent;
pub use geo_math::Location;
pub use model::{IdentificationEvent, InterceptAlert, OfficerState, TrackingSession};
pub use pipeline::{Pipeline, PipelineReport};
pub use proximity::ProximityAlertEngine;
pub use reid::{ReIdentificationTracker, TrackUpdate};
pub use sled_store::SledStore;
pub use store::{MemoryStore, SightingStore};
pub use watchlist::{WatchlistHit, WatchlistMatcher};
