//! Interdict deterministic scenario harness
//!
//! Runs the full alerting pipeline end to end against synthetic camera
//! traffic, with every source of non-determinism pinned down:
//! - **Time**: virtual clock that moves only when a scenario advances it
//! - **Randomness**: plates, placements and GPS jitter from one 64-bit seed
//! - **Delivery**: in-process push channels the harness can read back
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                      │
//! │  ┌──────────────────┐  events   ┌────────────────────┐  │
//! │  │ TrafficGenerator ├──────────►│      Pipeline      │  │
//! │  └──────────────────┘           │ watchlist/proximity│  │
//! │                                 │ re-identification  │  │
//! │                                 └─────────┬──────────┘  │
//! │                                           │ AlertEvent  │
//! │  ┌──────────────────┐           ┌─────────▼──────────┐  │
//! │  │ control/officer  │◄──────────┤  EventDispatcher   │  │
//! │  │    channels      │           └────────────────────┘  │
//! │  └──────────────────┘                                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use interdict_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Intercept);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod runner;
pub mod scenarios;
pub mod traffic;

pub use context::SimContext;
pub use error::SimError;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use traffic::{Camera, TrafficGenerator};
