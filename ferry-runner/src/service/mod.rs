//! Service layer
//!
//! Services hold the record-to-event transformation and the delivery of the
//! finished batch. The delivery side works through the repository traits so
//! it can be tested without a network.

pub mod batch;
mod delivery;

pub use batch::BatchAssembler;
pub use delivery::Deliverer;
