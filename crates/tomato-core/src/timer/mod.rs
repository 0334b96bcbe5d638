mod engine;
mod machine;
mod phase;

pub use engine::{PhaseEngine, TICK_INTERVAL};
pub use machine::{PhaseMachine, Transition, TICK_MS};
pub use phase::{PhaseKind, TimerState, TransitionCause};
