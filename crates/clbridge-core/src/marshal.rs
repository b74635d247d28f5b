use std::ffi::c_void;
use std::ptr;

use crate::runtime::{ManagedRuntime, ObjectRef};

/// A managed buffer plus a byte offset into it.
///
/// The buffer is not owned by the bridge. Its memory must stay valid and
/// unmoved for the duration of the native call, and for asynchronous
/// operations until the corresponding event fires.
#[derive(Debug, Clone, Copy)]
pub struct BufferRef {
    pub buffer: Option<ObjectRef>,
    pub byte_offset: usize,
}

impl BufferRef {
    pub const NULL: BufferRef = BufferRef { buffer: None, byte_offset: 0 };

    pub fn new(buffer: ObjectRef, byte_offset: usize) -> Self {
        Self { buffer: Some(buffer), byte_offset }
    }

    pub fn is_null(&self) -> bool {
        self.buffer.is_none()
    }

    /// See [`resolve_address`].
    pub fn resolve(&self, runtime: &dyn ManagedRuntime) -> *mut c_void {
        resolve_address(runtime, self.buffer, self.byte_offset)
    }
}

/// Turn a managed buffer and byte offset into a raw address.
///
/// An absent buffer yields null whatever the offset, and so does a buffer the
/// runtime reports no address for; offsets are never applied to null.
/// Bounds are not checked.
pub fn resolve_address(
    runtime: &dyn ManagedRuntime,
    buffer: Option<ObjectRef>,
    byte_offset: usize,
) -> *mut c_void {
    let Some(buffer) = buffer else {
        return ptr::null_mut();
    };
    let base = runtime.direct_buffer_address(buffer);
    if base.is_null() {
        return ptr::null_mut();
    }
    base.cast::<u8>().wrapping_add(byte_offset).cast()
}
