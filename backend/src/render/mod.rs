//! Render Cache & Coordinator (§4.5): given a resolved Recipe and its
//! input assets, decide whether an existing Card already satisfies it
//! or whether a new one needs building, and serialize concurrent
//! builders onto the same fingerprint.

mod coordinator;
mod fingerprint;

pub use coordinator::{BuildOutcome, RenderCoordinator};
pub use fingerprint::fingerprint;
