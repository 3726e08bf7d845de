//! Host primitives shared by the components
//!
//! Everything here goes through the context's launcher, so the same code runs
//! against the real host and against the fake host used in tests.

pub mod docker;
pub mod firewall;
pub mod packages;
pub mod systemd;
