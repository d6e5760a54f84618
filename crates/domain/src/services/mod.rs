//! Services composing the delay responder plus telemetry wiring.

pub mod clock;
pub mod delay;
pub mod interrupt;
pub mod sink;
pub mod telemetry;

pub use clock::*;
pub use delay::*;
pub use interrupt::*;
pub use sink::*;
pub use telemetry::*;
