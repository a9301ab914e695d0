//! Event-sourced stream engine.
//!
//! Three pieces share one transactional write path:
//! - [`log`]: appends events with a total per-stream sequence,
//! - [`broker`]: fans committed events out to live subscribers,
//! - [`uow`]: the unit-of-work tying projections, events, and publishes
//!   together so nothing is ever broadcast that is not durably persisted.

pub mod broker;
pub mod ids;
pub mod log;
pub mod types;
pub mod uow;

pub use broker::{Broker, Subscription, SUBSCRIBER_QUEUE_CAPACITY};
pub use types::{EventContext, EventFrame, EventRecord};
pub use uow::UnitOfWork;
