// Store lifecycle state machine
//
// Legal states and edges for a store, and the field changes tied to each
// edge. Persistence and auditing of a transition are the caller's job.

pub mod state_machine;

pub use state_machine::{next_status, LifecycleEvent, Transition, TransitionError};
