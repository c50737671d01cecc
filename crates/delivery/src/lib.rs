//! Delivery state machine for outbound notifications.
//!
//! One dequeued job flows gate → dispatcher → reconciler:
//! the gate decides proceed/skip/reschedule/terminal, the dispatcher sends
//! and classifies, the reconciler persists the outcome and handles throttle
//! bookkeeping. `worker::SendWorker` orchestrates the three and owns the
//! crash policy; `queue::SendQueue` provides the Redis-backed delivery
//! queue the binary consumes.

pub mod dispatcher;
pub mod gate;
pub mod notification;
pub mod queue;
pub mod reconciler;
pub mod render;
pub mod status_store;
pub mod throttle;
pub mod worker;
