//! Callback registry and dispatch.

pub mod attach;
pub mod dispatch;
pub mod registry;

pub use attach::AttachGuard;
pub use registry::{CallbackMethods, CallbackRegistry, KeepAlive};
