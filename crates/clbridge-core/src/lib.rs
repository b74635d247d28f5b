//! Shared data model of the compute bridge.
//!
//! Everything here is independent of how the native API is reached: the
//! managed-runtime contract, handle and buffer marshaling, mapped-region
//! geometry, callback kinds, configuration and errors.

pub mod config;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod kind;
pub mod marshal;
pub mod runtime;

pub use error::{BridgeError, RuntimeError};
pub use kind::CallbackKind;
pub use marshal::BufferRef;
pub use runtime::{AttachState, GlobalRef, ManagedRuntime, ManagedValue, MethodId, ObjectRef};
