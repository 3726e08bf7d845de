//! Launcher implementations

pub mod local;
#[cfg(feature = "test-utils")]
pub mod scripted;

pub use local::LocalLauncher;
#[cfg(feature = "test-utils")]
pub use scripted::ScriptedLauncher;
