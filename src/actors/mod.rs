//! Actor running the poll cycle
//!
//! ```text
//!            ┌──────────────────┐
//!            │ netpulse-poller  │
//!            └────────┬─────────┘
//!                     │ spawns, holds PollerHandle
//!            ┌────────▼─────────┐   probe    ┌─────────┐
//!            │   PollerActor    ├───────────►│ Prober  │
//!            └────────┬─────────┘            └─────────┘
//!                     │ save / append / get_or_create
//!            ┌────────▼─────────┐
//!            │      Stores      │
//!            └────────┬─────────┘
//!                     │ publish
//!            ┌────────▼─────────┐
//!            │ EventPublisher   │ → broadcast topic, webhook, WebSocket clients
//!            └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: `PollNow`, `UpdateInterval`, `Shutdown` over an mpsc channel
//! 2. **Stop signal**: a `watch` channel checked between devices and while waiting
//! 3. **Request/Response**: `PollNow` answers with a [`messages::CycleReport`] over a oneshot

pub mod messages;
pub mod poller;

pub use messages::{CycleReport, PollerCommand};
pub use poller::{PollerHandle, PollerSettings, run_single_pass, run_sweep};
