//! Interdict Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the Interdict core run in
//! both **Production** (tokio) and **Simulation** (virtual clock) setups.
//!
//! Everything the core needs from its surroundings goes through here:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning on the channel-owning context (`spawn()`)
//! - Live push channels (`PushChannel`)
//!
//! # Example
//!
//! ```ignore
//! use interdict_env::{InterdictContext, MpscChannel, PushChannel};
//!
//! async fn heartbeat<Ctx: InterdictContext>(ctx: &Ctx, channel: &MpscChannel) {
//!     loop {
//!         if channel.send("{\"type\":\"HEARTBEAT\"}").await.is_err() {
//!             break;
//!         }
//!         ctx.sleep(Duration::from_secs(15)).await;
//!     }
//! }
//! ```

mod context;
mod channel;
mod types;
mod error;
mod tokio_impl;

pub use context::InterdictContext;
pub use channel::{MpscChannel, PushChannel};
pub use types::{ChannelTarget, ClientId};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
