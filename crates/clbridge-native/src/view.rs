use std::ffi::c_void;
use std::ptr::NonNull;

use clbridge_core::{ManagedRuntime, ObjectRef};

/// A mapped memory region with a known length.
///
/// The memory belongs to the driver and stays valid until the region is
/// unmapped (see `enqueue_unmap_mem_object`), which consumes the view.
#[derive(Debug)]
pub struct MappedView {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedView {
    pub(crate) fn new(ptr: NonNull<c_void>, len: usize) -> Self {
        Self { ptr: ptr.cast(), len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    /// The mapping must still be live and no device-side command may write
    /// to it concurrently.
    pub unsafe fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// # Safety
    /// As [`MappedView::as_slice`], and the region must have been mapped for
    /// writing.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Hand the region to the managed side as a direct buffer of `len` bytes.
    pub fn to_direct_buffer(&self, runtime: &dyn ManagedRuntime) -> Option<ObjectRef> {
        runtime.new_direct_buffer(self.ptr.as_ptr().cast(), self.len)
    }
}
