// (c) 2025 peerlink developers

//! General utility code that didn't fit anywhere else

pub mod addr;

mod cert;
pub use cert::Credentials;

pub mod names;
pub use names::UniqueNameGenerator;

mod trace;
pub use trace::setup_tracing_for_tests;
