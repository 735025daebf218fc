// (c) 2025 peerlink developers

//! Concurrency primitives shared by the connection and client layers

pub mod flag;
pub mod map;
pub mod queue;
