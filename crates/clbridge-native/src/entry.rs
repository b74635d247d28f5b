//! Entry points, one per bridged native operation.
//!
//! Every entry point resolves its buffer references, registers a callback if
//! one was given, issues the native call through the explicitly supplied
//! function pointer and settles the registration: handed to the driver on
//! success, discarded on failure. None of them keeps state between calls.
//!
//! Native statuses and handles are returned unchanged; `Err` is reserved for
//! bridge-level failures.

use std::ffi::{c_void, CString};
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use clbridge_core::geometry::MappedRegionDescriptor;
use clbridge_core::handle::{self, ManagedHandle};
use clbridge_core::{BridgeError, BufferRef, CallbackKind, ManagedRuntime, ObjectRef};

use crate::callbacks::dispatch::{
    build_finished_trampoline, context_error_trampoline, event_status_trampoline,
    mem_destroyed_trampoline,
};
use crate::callbacks::{CallbackRegistry, KeepAlive};
use crate::cl_api::*;
use crate::status::{is_success, status_name};
use crate::view::MappedView;

/// Release function shape shared by every `clRelease*` call.
pub type FnClRelease = unsafe extern "system" fn(*mut c_void) -> ClInt;

/// Trampoline and user data for a native call, null when nothing was registered.
fn notify_args<F>(token: &Option<KeepAlive>, trampoline: F) -> (Option<F>, *mut c_void) {
    match token {
        Some(token) => (Some(trampoline), token.user_data()),
        None => (None, ptr::null_mut()),
    }
}

fn settle(token: Option<KeepAlive>, accepted: bool) {
    if let Some(token) = token {
        if accepted {
            token.hand_to_driver();
        } else {
            token.discard();
        }
    }
}

fn settle_context(
    callbacks: &CallbackRegistry,
    token: Option<KeepAlive>,
    context: ClContext,
) -> Result<(), BridgeError> {
    match token {
        Some(token) if context.is_null() => token.discard(),
        Some(token) => callbacks.bind_context(handle::to_managed(context), token)?,
        None => {}
    }
    Ok(())
}

fn managed_string(
    runtime: &dyn ManagedRuntime,
    string: Option<ObjectRef>,
) -> Result<Option<CString>, BridgeError> {
    string
        .map(|s| runtime.utf8_string(s).ok_or(BridgeError::StringExtraction))
        .transpose()
}

/// # Safety
/// Every buffer reference must cover the memory the native call reads or
/// writes, and `f` must be a valid `clCreateContext`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn create_context(
    f: FnClCreateContext,
    callbacks: &CallbackRegistry,
    properties: BufferRef,
    num_devices: ClUint,
    devices: BufferRef,
    error_handler: Option<ObjectRef>,
    errcode: BufferRef,
) -> Result<ManagedHandle, BridgeError> {
    let runtime = callbacks.runtime();
    let properties = properties.resolve(runtime) as *const isize;
    let devices = devices.resolve(runtime) as *const ClDeviceId;
    let errcode = errcode.resolve(runtime) as *mut ClInt;

    let token = callbacks.register(CallbackKind::ContextError, error_handler)?;
    let (pfn, user_data) = notify_args(&token, context_error_trampoline as ContextNotifyFn);

    let context = unsafe { f(properties, num_devices, devices, pfn, user_data, errcode) };
    debug!("clCreateContext(num_devices={}) -> {:p}", num_devices, context);

    settle_context(callbacks, token, context)?;
    Ok(handle::to_managed(context))
}

/// # Safety
/// As [`create_context`].
pub unsafe fn create_context_from_type(
    f: FnClCreateContextFromType,
    callbacks: &CallbackRegistry,
    properties: BufferRef,
    device_type: ClBitfield,
    error_handler: Option<ObjectRef>,
    errcode: BufferRef,
) -> Result<ManagedHandle, BridgeError> {
    let runtime = callbacks.runtime();
    let properties = properties.resolve(runtime) as *const isize;
    let errcode = errcode.resolve(runtime) as *mut ClInt;

    let token = callbacks.register(CallbackKind::ContextError, error_handler)?;
    let (pfn, user_data) = notify_args(&token, context_error_trampoline as ContextNotifyFn);

    let context = unsafe { f(properties, device_type, pfn, user_data, errcode) };
    debug!("clCreateContextFromType(type={:#x}) -> {:p}", device_type, context);

    settle_context(callbacks, token, context)?;
    Ok(handle::to_managed(context))
}

/// Release a context and, once the driver accepted the release, its error
/// handler.
///
/// # Safety
/// `f` must be a valid `clReleaseContext`.
pub unsafe fn release_context(
    f: FnClReleaseContext,
    callbacks: &CallbackRegistry,
    context: ManagedHandle,
) -> ClInt {
    let status = unsafe { f(handle::to_native(context)) };
    debug!("clReleaseContext({:#x}) -> {}", context, status_name(status));
    if is_success(status) && callbacks.release_context(context) {
        debug!("released error handler of context {:#x}", context);
    }
    status
}

/// # Safety
/// `errcode` must cover one `cl_int`; `f` must be a valid `clCreateCommandQueue`.
pub unsafe fn create_command_queue(
    f: FnClCreateCommandQueue,
    runtime: &dyn ManagedRuntime,
    context: ManagedHandle,
    device: ManagedHandle,
    properties: ClBitfield,
    errcode: BufferRef,
) -> ManagedHandle {
    let errcode = errcode.resolve(runtime) as *mut ClInt;
    let queue = unsafe {
        f(handle::to_native(context), handle::to_native(device), properties, errcode)
    };
    debug!("clCreateCommandQueue(context={:#x}) -> {:p}", context, queue);
    handle::to_managed(queue)
}

/// Plain passthrough for the `clRelease*` family.
///
/// # Safety
/// `f` must be a valid release function for the kind of object `object` is.
pub unsafe fn release_object(f: FnClRelease, name: &'static str, object: ManagedHandle) -> ClInt {
    let status = unsafe { f(handle::to_native(object)) };
    debug!("{}({:#x}) -> {}", name, object, status_name(status));
    status
}

/// # Safety
/// `device_list` must cover `num_devices` device ids; `f` must be a valid
/// `clBuildProgram`.
pub unsafe fn build_program(
    f: FnClBuildProgram,
    callbacks: &CallbackRegistry,
    program: ManagedHandle,
    num_devices: ClUint,
    device_list: BufferRef,
    options: Option<ObjectRef>,
    listener: Option<ObjectRef>,
) -> Result<ClInt, BridgeError> {
    let runtime = callbacks.runtime();
    let device_list = device_list.resolve(runtime) as *const ClDeviceId;
    let options = managed_string(runtime, options)?;

    let token = callbacks.register(CallbackKind::ProgramBuildFinished, listener)?;
    let (pfn, user_data) = notify_args(&token, build_finished_trampoline as BuildNotifyFn);

    let status = unsafe {
        f(
            handle::to_native(program),
            num_devices,
            device_list,
            options.as_ref().map_or(ptr::null(), |o| o.as_ptr()),
            pfn,
            user_data,
        )
    };
    debug!("clBuildProgram({:#x}) -> {}", program, status_name(status));

    settle(token, is_success(status));
    Ok(status)
}

/// # Safety
/// `f` must be a valid `clSetEventCallback`.
pub unsafe fn set_event_callback(
    f: FnClSetEventCallback,
    callbacks: &CallbackRegistry,
    event: ManagedHandle,
    trigger_status: ClInt,
    listener: Option<ObjectRef>,
) -> Result<ClInt, BridgeError> {
    let token = callbacks.register(CallbackKind::EventStatusChanged, listener)?;
    let (pfn, user_data) = notify_args(&token, event_status_trampoline as EventNotifyFn);

    let status = unsafe { f(handle::to_native(event), trigger_status, pfn, user_data) };
    debug!(
        "clSetEventCallback({:#x}, trigger={}) -> {}",
        event,
        trigger_status,
        status_name(status)
    );

    settle(token, is_success(status));
    Ok(status)
}

/// # Safety
/// `f` must be a valid `clSetMemObjectDestructorCallback`.
pub unsafe fn set_mem_object_destructor_callback(
    f: FnClSetMemObjectDestructorCallback,
    callbacks: &CallbackRegistry,
    memobj: ManagedHandle,
    listener: Option<ObjectRef>,
) -> Result<ClInt, BridgeError> {
    let token = callbacks.register(CallbackKind::MemoryObjectDestroyed, listener)?;
    let (pfn, user_data) = notify_args(&token, mem_destroyed_trampoline as MemDestructorFn);

    let status = unsafe { f(handle::to_native(memobj), pfn, user_data) };
    debug!(
        "clSetMemObjectDestructorCallback({:#x}) -> {}",
        memobj,
        status_name(status)
    );

    settle(token, is_success(status));
    Ok(status)
}

/// Map `size` bytes of a buffer object. `Ok(None)` when the driver returned
/// no mapping; its status is in `errcode`.
///
/// # Safety
/// `wait_list` must cover `num_events` events, `event` one event and
/// `errcode` one `cl_int`; `f` must be a valid `clEnqueueMapBuffer`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn enqueue_map_buffer(
    f: FnClEnqueueMapBuffer,
    runtime: &dyn ManagedRuntime,
    queue: ManagedHandle,
    buffer: ManagedHandle,
    blocking: bool,
    flags: ClBitfield,
    offset: usize,
    size: usize,
    num_events: ClUint,
    wait_list: BufferRef,
    event: BufferRef,
    errcode: BufferRef,
) -> Option<MappedView> {
    let wait_list = wait_list.resolve(runtime) as *const ClEvent;
    let event = event.resolve(runtime) as *mut ClEvent;
    let errcode = errcode.resolve(runtime) as *mut ClInt;

    let mapped = unsafe {
        f(
            handle::to_native(queue),
            handle::to_native(buffer),
            ClUint::from(blocking),
            flags,
            offset,
            size,
            num_events,
            wait_list,
            event,
            errcode,
        )
    };
    debug!("clEnqueueMapBuffer({:#x}, size={}) -> {:p}", buffer, size, mapped);

    NonNull::new(mapped).map(|ptr| MappedView::new(ptr, size))
}

/// Scalar image property, as reported by `clGetImageInfo`.
unsafe fn image_info(
    f: FnClGetImageInfo,
    image: ClMem,
    param: ClUint,
    param_name: &'static str,
) -> Result<usize, BridgeError> {
    let mut value: usize = 0;
    let status = unsafe {
        f(
            image,
            param,
            std::mem::size_of::<usize>(),
            (&mut value as *mut usize).cast(),
            ptr::null_mut(),
        )
    };
    if is_success(status) {
        Ok(value)
    } else {
        Err(BridgeError::GeometryQuery { param: param_name, status })
    }
}

/// Read a `size_t[3]` the caller passed by reference, zeros when absent.
unsafe fn read_triple(ptr: *const usize) -> [usize; 3] {
    if ptr.is_null() {
        return [0; 3];
    }
    unsafe { ptr::read_unaligned(ptr.cast::<[usize; 3]>()) }
}

/// Geometry of a region `clEnqueueMapImage` just mapped.
unsafe fn image_geometry(
    info: FnClGetImageInfo,
    image: ClMem,
    origin: *const usize,
    range: *const usize,
    row_pitch: *const usize,
    slice_pitch: *const usize,
) -> Result<MappedRegionDescriptor, BridgeError> {
    let element_size =
        unsafe { image_info(info, image, CL_IMAGE_ELEMENT_SIZE, "CL_IMAGE_ELEMENT_SIZE")? };
    let depth = unsafe { image_info(info, image, CL_IMAGE_DEPTH, "CL_IMAGE_DEPTH")? };
    let pitch = |p: *const usize| if p.is_null() { 0 } else { unsafe { ptr::read_unaligned(p) } };
    Ok(MappedRegionDescriptor {
        element_size,
        depth,
        row_pitch: pitch(row_pitch),
        slice_pitch: pitch(slice_pitch),
        origin: unsafe { read_triple(origin) },
        range: unsafe { read_triple(range) },
    })
}

/// Map an image region and bound the returned pointer by the region's
/// geometry.
///
/// If either geometry query fails after a successful mapping the error is
/// returned and the region stays mapped until the image is released.
///
/// # Safety
/// `origin` and `range` must cover three `size_t`, the pitch outputs one
/// `size_t` each, plus the requirements of [`enqueue_map_buffer`]; `map` and
/// `info` must be valid `clEnqueueMapImage` and `clGetImageInfo`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn enqueue_map_image(
    map: FnClEnqueueMapImage,
    info: FnClGetImageInfo,
    runtime: &dyn ManagedRuntime,
    queue: ManagedHandle,
    image: ManagedHandle,
    blocking: bool,
    flags: ClBitfield,
    origin: BufferRef,
    range: BufferRef,
    row_pitch: BufferRef,
    slice_pitch: BufferRef,
    num_events: ClUint,
    wait_list: BufferRef,
    event: BufferRef,
    errcode: BufferRef,
) -> Result<Option<MappedView>, BridgeError> {
    let origin = origin.resolve(runtime) as *const usize;
    let range = range.resolve(runtime) as *const usize;
    let row_pitch = row_pitch.resolve(runtime) as *mut usize;
    let slice_pitch = slice_pitch.resolve(runtime) as *mut usize;
    let wait_list = wait_list.resolve(runtime) as *const ClEvent;
    let event = event.resolve(runtime) as *mut ClEvent;
    let errcode = errcode.resolve(runtime) as *mut ClInt;
    let image = handle::to_native(image);

    let mapped = unsafe {
        map(
            handle::to_native(queue),
            image,
            ClUint::from(blocking),
            flags,
            origin,
            range,
            row_pitch,
            slice_pitch,
            num_events,
            wait_list,
            event,
            errcode,
        )
    };
    debug!("clEnqueueMapImage({:p}) -> {:p}", image, mapped);
    let Some(mapped) = NonNull::new(mapped) else {
        return Ok(None);
    };

    let geometry = unsafe { image_geometry(info, image, origin, range, row_pitch, slice_pitch) };
    let len = match geometry.and_then(|g| g.byte_size()) {
        Ok(len) => len,
        Err(e) => {
            warn!("image {:p} left mapped at {:p}: {}", image, mapped, e);
            return Err(e);
        }
    };

    Ok(Some(MappedView::new(mapped, len)))
}

/// End a mapping. The view is consumed whatever the status.
///
/// # Safety
/// `view` must come from a mapping of `memobj` on `queue`; `f` must be a
/// valid `clEnqueueUnmapMemObject`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn enqueue_unmap_mem_object(
    f: FnClEnqueueUnmapMemObject,
    runtime: &dyn ManagedRuntime,
    queue: ManagedHandle,
    memobj: ManagedHandle,
    view: MappedView,
    num_events: ClUint,
    wait_list: BufferRef,
    event: BufferRef,
) -> ClInt {
    let wait_list = wait_list.resolve(runtime) as *const ClEvent;
    let event = event.resolve(runtime) as *mut ClEvent;
    let status = unsafe {
        f(
            handle::to_native(queue),
            handle::to_native(memobj),
            view.as_ptr().cast(),
            num_events,
            wait_list,
            event,
        )
    };
    debug!("clEnqueueUnmapMemObject({:#x}) -> {}", memobj, status_name(status));
    status
}

/// Address of a vendor extension function, `None` if the loader has none.
///
/// # Safety
/// `f` must be a valid `clGetExtensionFunctionAddress`.
pub unsafe fn get_extension_function_address(
    f: FnClGetExtensionFunctionAddress,
    name: &str,
) -> Option<NonNull<c_void>> {
    let name = CString::new(name).ok()?;
    NonNull::new(unsafe { f(name.as_ptr()) })
}
