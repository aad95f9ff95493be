//! Application layer use cases for the host.
//!
//! Use cases orchestrate domain objects from `skybridge-core` against the
//! collaborator traits declared by the infrastructure layer, so every test
//! can run fully deterministic with fake collaborators.
//!
//! # Sub-modules
//!
//! - **`negotiate`** – The transport negotiation coordinator: maintains the
//!   live peer and account directories and executes the priority walk that
//!   picks one concrete transport.  This is the heart of connection
//!   establishment.
//!
//! - **`sessions`** – The in-memory registry of active streaming sessions
//!   and their per-frame counters.

pub mod negotiate;
pub mod sessions;
