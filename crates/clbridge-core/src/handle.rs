//! Managed <-> native handle conversion.
//!
//! The managed side carries every native handle (context, queue, program,
//! memory object, event, device) as an `i64`. The bridge never looks at the
//! bits, it only widens and narrows.

use std::ffi::c_void;

/// Managed representation of a native handle.
pub type ManagedHandle = i64;

// A pointer wider than the managed handle would silently truncate.
const _: () = assert!(
    usize::BITS <= i64::BITS,
    "native pointers do not fit in a managed handle on this target"
);

/// Widen a native handle to its managed representation.
pub fn to_managed(raw: *mut c_void) -> ManagedHandle {
    raw as usize as u64 as i64
}

/// Narrow a managed handle back to a native pointer-sized value.
///
/// Panics if the value does not fit the target's pointer width, which can
/// only happen for a handle that was never produced by [`to_managed`].
pub fn to_native(handle: ManagedHandle) -> *mut c_void {
    let bits = handle as u64;
    let raw = usize::try_from(bits)
        .unwrap_or_else(|_| panic!("managed handle {bits:#x} exceeds native pointer width"));
    raw as *mut c_void
}

pub fn is_null(handle: ManagedHandle) -> bool {
    handle == 0
}
