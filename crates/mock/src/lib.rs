//! Local substitute data producer.
//!
//! When active, every channel that is registered, subscribed to, or sent
//! a request receives synthetic periodic payloads, so the rest of the
//! client behaves identically whether or not a live backend is
//! reachable. Every synthetic payload is tagged `isMock: true` so the
//! dashboard can visually distinguish it from live data.

mod generators;
mod source;

pub use generators::{cadence, generate, supported};
pub use source::MockSource;
