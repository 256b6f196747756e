//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports. The in-memory network backs the
//! test suite and local dry runs.

mod in_memory;

pub use in_memory::{
    CallTrace, CommitScript, InMemoryChannel, InMemoryClient, InMemoryEventSource,
    InMemoryNetwork, OrdererScript, PeerScript, ProposalScript, TraceEntry,
};
