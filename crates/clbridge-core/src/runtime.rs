//! Contract of the managed runtime the bridge re-enters.
//!
//! The embedding application implements [`ManagedRuntime`] over its own
//! object model. The bridge only ever needs the handful of calls below.

use std::ffi::{c_void, CStr, CString};
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use crate::error::RuntimeError;

/// A local reference to a managed object.
///
/// Local references are only valid on the thread that received them, so this
/// type is deliberately neither `Send` nor `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectRef(NonNull<c_void>);

impl ObjectRef {
    /// Wrap a raw runtime reference. Returns `None` for the null reference.
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// A long-lived reference that keeps a managed object reachable across
/// garbage collections and threads until it is explicitly deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct GlobalRef(NonZeroUsize);

impl GlobalRef {
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(raw as usize).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

/// Identifier of a managed method, resolved once and valid on every thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MethodId(NonZeroUsize);

impl MethodId {
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(raw as usize).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

/// Outcome of attaching the current native thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    /// The call attached the thread; a matching detach is owed.
    Attached,
    /// The thread was already known to the runtime; it must not be detached.
    AlreadyAttached,
}

/// Argument passed to a managed method.
#[derive(Debug, Clone, Copy)]
pub enum ManagedValue<'a> {
    Long(i64),
    Int(i32),
    /// Turned into a managed string by the runtime.
    Str(&'a CStr),
    Null,
}

pub trait ManagedRuntime: Send + Sync {
    /// Attach the calling native thread. Safe to call on an attached thread.
    fn attach_current_thread(&self) -> Result<AttachState, RuntimeError>;

    fn detach_current_thread(&self);

    fn new_global_ref(&self, object: ObjectRef) -> Option<GlobalRef>;

    fn delete_global_ref(&self, global: GlobalRef);

    /// Base address of a direct buffer, or null if `buffer` is not one.
    fn direct_buffer_address(&self, buffer: ObjectRef) -> *mut c_void;

    /// Modified-UTF-8 contents of a managed string.
    fn utf8_string(&self, string: ObjectRef) -> Option<CString>;

    fn resolve_method(&self, class: &str, name: &str, signature: &str) -> Option<MethodId>;

    /// Invoke a `void` instance method on `target`.
    ///
    /// An `Err` means the managed method raised; the runtime keeps whatever
    /// pending-failure state it uses for that.
    fn call_void_method(
        &self,
        target: GlobalRef,
        method: MethodId,
        args: &[ManagedValue<'_>],
    ) -> Result<(), RuntimeError>;

    /// Wrap `capacity` bytes at `address` in a managed direct buffer.
    fn new_direct_buffer(&self, address: *mut c_void, capacity: usize) -> Option<ObjectRef>;
}
