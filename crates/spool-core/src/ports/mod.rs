//! Ports - seams between the scheduler and what it depends on.

pub mod clock;
pub mod dead_letter;
pub mod driver;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};
pub use self::driver::WorkerDriver;
pub use self::id_generator::{IdGenerator, UlidGenerator};
