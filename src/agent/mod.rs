pub mod runtime;

pub use runtime::{Pipeline, TurnOutcome, TurnReport, TurnState};
