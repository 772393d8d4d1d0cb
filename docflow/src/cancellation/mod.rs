//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancellationToken`] is shared by `Arc` between the caller and every
//! stage of a run. The resilience client races each network call, backoff
//! sleep and coordinator wait against [`CancellationToken::cancelled`].

mod token;

pub use token::{CancelCallback, CancellationToken};
