//! Multi-source status aggregation.

pub mod aggregator;
pub mod merge;
pub mod snapshot;

pub use aggregator::StatusAggregator;
pub use merge::{Observation, Payload, merge};
pub use snapshot::{
    Blockchain, ContainerGuess, Epoch, MlNode, Overview, Reachability, Security, Source, Sourced,
    StatusSnapshot,
};
