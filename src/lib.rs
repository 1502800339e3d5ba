//! Dispute & refund resolution engine for a coaching marketplace: tiered
//! cancellation-policy evaluation, the dispute-ticket state machine, and the
//! transactional settlement step that ties ticket state to money movement.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
