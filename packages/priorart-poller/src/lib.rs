//! Client side of the long-running search protocol: trigger once, wait a fixed delay, poll with a
//! bounded attempt budget, and survive restarts through a durable job snapshot.

pub mod client;
pub mod job;
pub mod poller;
pub mod snapshot;

mod error;

pub use client::{BoxFuture, HttpSearchApi, RemoteStatus, SearchApi};
pub use error::{Error, Result};
pub use job::{JobKey, JobState, NO_RESULTS_FOUND, PollPolicy, SearchJob};
pub use poller::{Clock, PollOutcome, Poller};
pub use snapshot::{FileSnapshots, MemorySnapshots, SnapshotStore};
