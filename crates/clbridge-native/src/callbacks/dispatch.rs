//! Trampolines handed to the driver, one per callback kind.
//!
//! They run on driver threads the managed runtime has never seen. Each one
//! attaches, invokes, releases single-fire registrations and detaches, in
//! that order.

use std::ffi::{c_char, c_void, CStr};

use tracing::{debug, error, warn};

use clbridge_core::handle;
use clbridge_core::{CallbackKind, ManagedValue};

use super::attach::AttachGuard;
use super::registry;
use crate::cl_api::{ClEvent, ClInt, ClMem, ClProgram};

fn fire(user_data: *mut c_void, kind: CallbackKind, args: &[ManagedValue<'_>]) {
    let id = user_data as usize;
    let Some(runtime) = registry::runtime_of(id) else {
        warn!("{} callback fired for unknown registration {:#x}", kind, id);
        return;
    };

    // No registration is held until the thread is attached, so none can be
    // released from an unattached thread.
    let _attached = match AttachGuard::acquire(runtime.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            error!("{} callback not delivered: {}", kind, e);
            return;
        }
    };

    // Single-fire: only the firing that removes the registration invokes it.
    let registration = if kind.is_single_fire() {
        registry::take(id)
    } else {
        registry::lookup(id)
    };
    let Some(registration) = registration else {
        debug!("{} registration {:#x} gone before delivery", kind, id);
        return;
    };
    debug_assert_eq!(registration.kind(), kind);

    if let Err(e) = registration.invoke(args) {
        error!("{} callback raised: {}", kind, e);
    }
    // `registration` drops before `_attached`: the keep-alive is released
    // while the thread is still attached.
}

/// Context error notification.
///
/// # Safety
/// `errinfo` must be null or a valid NUL-terminated string.
pub unsafe extern "system" fn context_error_trampoline(
    errinfo: *const c_char,
    _private_info: *const c_void,
    cb: usize,
    user_data: *mut c_void,
) {
    let message = if errinfo.is_null() {
        c""
    } else {
        unsafe { CStr::from_ptr(errinfo) }
    };
    // The private info payload is not forwarded; only its size is.
    fire(
        user_data,
        CallbackKind::ContextError,
        &[ManagedValue::Str(message), ManagedValue::Null, ManagedValue::Long(cb as i64)],
    );
}

/// Program build completion.
///
/// # Safety
/// Called by the driver with the `user_data` it was registered with.
pub unsafe extern "system" fn build_finished_trampoline(program: ClProgram, user_data: *mut c_void) {
    fire(
        user_data,
        CallbackKind::ProgramBuildFinished,
        &[ManagedValue::Long(handle::to_managed(program))],
    );
}

/// Event status change.
///
/// # Safety
/// Called by the driver with the `user_data` it was registered with.
pub unsafe extern "system" fn event_status_trampoline(
    event: ClEvent,
    status: ClInt,
    user_data: *mut c_void,
) {
    fire(
        user_data,
        CallbackKind::EventStatusChanged,
        &[ManagedValue::Long(handle::to_managed(event)), ManagedValue::Int(status)],
    );
}

/// Memory object destruction.
///
/// # Safety
/// Called by the driver with the `user_data` it was registered with.
pub unsafe extern "system" fn mem_destroyed_trampoline(memobj: ClMem, user_data: *mut c_void) {
    fire(
        user_data,
        CallbackKind::MemoryObjectDestroyed,
        &[ManagedValue::Long(handle::to_managed(memobj))],
    );
}
