//! Native half of the compute bridge.
//!
//! Entry points marshal managed arguments into OpenCL calls made through a
//! runtime-resolved function table, and route driver callbacks back into the
//! managed runtime on whatever thread the driver picks. See [`entry`] for the
//! raw entry points and [`Bridge`] for the table-backed facade.

pub mod bridge;
pub mod callbacks;
pub mod cl_api;
pub mod entry;
pub mod status;
pub mod view;

pub use bridge::Bridge;
pub use callbacks::{CallbackRegistry, KeepAlive};
pub use cl_api::ClApi;
pub use view::MappedView;
