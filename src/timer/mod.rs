pub mod controller;
pub mod state;

pub use controller::{ClockEvent, ClockSnapshot, QuestionClock};
pub use state::{CountdownState, CountdownStatus};
