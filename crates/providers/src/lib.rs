//! Generation backend implementations for Promptloom.
//!
//! All backends implement the `promptloom_core::Provider` trait and accept
//! the same flattened prompt; the factory selects one from configuration
//! at process start.

pub mod factory;
#[cfg(feature = "local")]
pub mod local;
pub mod remote;
pub mod translate;

pub use factory::build_provider;
#[cfg(feature = "local")]
pub use local::LocalProvider;
pub use remote::RemoteProvider;
