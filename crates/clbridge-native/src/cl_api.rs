//! OpenCL function table.
//!
//! Entry points take their native function pointer explicitly. The table is
//! filled either at runtime from the platform's OpenCL loader through
//! `libloading`, or, with the `static-link` feature, from symbols linked
//! directly into the binary. Functions the loader does not export stay `None`.

use std::ffi::{c_char, c_void};
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::{debug, info};

use clbridge_core::BridgeError;

/// OpenCL status code (cl_int).
pub type ClInt = i32;
pub type ClUint = u32;
pub type ClBitfield = u64;

/// Opaque OpenCL object handles.
pub type ClContext = *mut c_void;
pub type ClDeviceId = *mut c_void;
pub type ClCommandQueue = *mut c_void;
pub type ClProgram = *mut c_void;
pub type ClMem = *mut c_void;
pub type ClEvent = *mut c_void;

pub const CL_SUCCESS: ClInt = 0;

pub const CL_IMAGE_ELEMENT_SIZE: ClUint = 0x1111;
pub const CL_IMAGE_DEPTH: ClUint = 0x1116;

// Notification signatures the driver calls back through.
pub type ContextNotifyFn = unsafe extern "system" fn(
    errinfo: *const c_char,
    private_info: *const c_void,
    cb: usize,
    user_data: *mut c_void,
);
pub type BuildNotifyFn = unsafe extern "system" fn(program: ClProgram, user_data: *mut c_void);
pub type EventNotifyFn =
    unsafe extern "system" fn(event: ClEvent, status: ClInt, user_data: *mut c_void);
pub type MemDestructorFn = unsafe extern "system" fn(memobj: ClMem, user_data: *mut c_void);

/// Function pointer type definitions for the OpenCL API.
pub type FnClCreateContext = unsafe extern "system" fn(
    properties: *const isize,
    num_devices: ClUint,
    devices: *const ClDeviceId,
    pfn_notify: Option<ContextNotifyFn>,
    user_data: *mut c_void,
    errcode_ret: *mut ClInt,
) -> ClContext;
pub type FnClCreateContextFromType = unsafe extern "system" fn(
    properties: *const isize,
    device_type: ClBitfield,
    pfn_notify: Option<ContextNotifyFn>,
    user_data: *mut c_void,
    errcode_ret: *mut ClInt,
) -> ClContext;
pub type FnClReleaseContext = unsafe extern "system" fn(context: ClContext) -> ClInt;

pub type FnClCreateCommandQueue = unsafe extern "system" fn(
    context: ClContext,
    device: ClDeviceId,
    properties: ClBitfield,
    errcode_ret: *mut ClInt,
) -> ClCommandQueue;
pub type FnClReleaseCommandQueue = unsafe extern "system" fn(queue: ClCommandQueue) -> ClInt;

pub type FnClBuildProgram = unsafe extern "system" fn(
    program: ClProgram,
    num_devices: ClUint,
    device_list: *const ClDeviceId,
    options: *const c_char,
    pfn_notify: Option<BuildNotifyFn>,
    user_data: *mut c_void,
) -> ClInt;
pub type FnClReleaseProgram = unsafe extern "system" fn(program: ClProgram) -> ClInt;

pub type FnClSetEventCallback = unsafe extern "system" fn(
    event: ClEvent,
    command_exec_callback_type: ClInt,
    pfn_notify: Option<EventNotifyFn>,
    user_data: *mut c_void,
) -> ClInt;
pub type FnClReleaseEvent = unsafe extern "system" fn(event: ClEvent) -> ClInt;

pub type FnClSetMemObjectDestructorCallback = unsafe extern "system" fn(
    memobj: ClMem,
    pfn_notify: Option<MemDestructorFn>,
    user_data: *mut c_void,
) -> ClInt;
pub type FnClReleaseMemObject = unsafe extern "system" fn(memobj: ClMem) -> ClInt;

pub type FnClEnqueueMapBuffer = unsafe extern "system" fn(
    queue: ClCommandQueue,
    buffer: ClMem,
    blocking_map: ClUint,
    map_flags: ClBitfield,
    offset: usize,
    size: usize,
    num_events_in_wait_list: ClUint,
    event_wait_list: *const ClEvent,
    event: *mut ClEvent,
    errcode_ret: *mut ClInt,
) -> *mut c_void;
pub type FnClEnqueueMapImage = unsafe extern "system" fn(
    queue: ClCommandQueue,
    image: ClMem,
    blocking_map: ClUint,
    map_flags: ClBitfield,
    origin: *const usize,
    region: *const usize,
    image_row_pitch: *mut usize,
    image_slice_pitch: *mut usize,
    num_events_in_wait_list: ClUint,
    event_wait_list: *const ClEvent,
    event: *mut ClEvent,
    errcode_ret: *mut ClInt,
) -> *mut c_void;
pub type FnClEnqueueUnmapMemObject = unsafe extern "system" fn(
    queue: ClCommandQueue,
    memobj: ClMem,
    mapped_ptr: *mut c_void,
    num_events_in_wait_list: ClUint,
    event_wait_list: *const ClEvent,
    event: *mut ClEvent,
) -> ClInt;
pub type FnClGetImageInfo = unsafe extern "system" fn(
    image: ClMem,
    param_name: ClUint,
    param_value_size: usize,
    param_value: *mut c_void,
    param_value_size_ret: *mut usize,
) -> ClInt;
pub type FnClGetExtensionFunctionAddress =
    unsafe extern "system" fn(func_name: *const c_char) -> *mut c_void;

/// Resolved OpenCL entry points.
#[derive(Default, Clone)]
pub struct ClApi {
    // Keeps the loader mapped while any copied pointer may still be called.
    lib: Option<Arc<Library>>,
    // Context
    pub create_context: Option<FnClCreateContext>,
    pub create_context_from_type: Option<FnClCreateContextFromType>,
    pub release_context: Option<FnClReleaseContext>,
    // Command queue
    pub create_command_queue: Option<FnClCreateCommandQueue>,
    pub release_command_queue: Option<FnClReleaseCommandQueue>,
    // Program
    pub build_program: Option<FnClBuildProgram>,
    pub release_program: Option<FnClReleaseProgram>,
    // Event
    pub set_event_callback: Option<FnClSetEventCallback>,
    pub release_event: Option<FnClReleaseEvent>,
    // Memory
    pub set_mem_object_destructor_callback: Option<FnClSetMemObjectDestructorCallback>,
    pub release_mem_object: Option<FnClReleaseMemObject>,
    pub enqueue_map_buffer: Option<FnClEnqueueMapBuffer>,
    pub enqueue_map_image: Option<FnClEnqueueMapImage>,
    pub enqueue_unmap_mem_object: Option<FnClEnqueueUnmapMemObject>,
    pub get_image_info: Option<FnClGetImageInfo>,
    // Extensions
    pub get_extension_function_address: Option<FnClGetExtensionFunctionAddress>,
}

impl ClApi {
    /// An empty table; every entry point reports its function as unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the OpenCL loader and resolve every known entry point.
    ///
    /// `paths` are tried in order; an empty list means the platform defaults.
    pub fn load(paths: &[String]) -> Result<Self, BridgeError> {
        let lib = Self::load_library(paths)?;

        let api = unsafe {
            Self {
                create_context: Self::load_fn_opt(&lib, "clCreateContext"),
                create_context_from_type: Self::load_fn_opt(&lib, "clCreateContextFromType"),
                release_context: Self::load_fn_opt(&lib, "clReleaseContext"),
                create_command_queue: Self::load_fn_opt(&lib, "clCreateCommandQueue"),
                release_command_queue: Self::load_fn_opt(&lib, "clReleaseCommandQueue"),
                build_program: Self::load_fn_opt(&lib, "clBuildProgram"),
                release_program: Self::load_fn_opt(&lib, "clReleaseProgram"),
                set_event_callback: Self::load_fn_opt(&lib, "clSetEventCallback"),
                release_event: Self::load_fn_opt(&lib, "clReleaseEvent"),
                set_mem_object_destructor_callback: Self::load_fn_opt(
                    &lib,
                    "clSetMemObjectDestructorCallback",
                ),
                release_mem_object: Self::load_fn_opt(&lib, "clReleaseMemObject"),
                enqueue_map_buffer: Self::load_fn_opt(&lib, "clEnqueueMapBuffer"),
                enqueue_map_image: Self::load_fn_opt(&lib, "clEnqueueMapImage"),
                enqueue_unmap_mem_object: Self::load_fn_opt(&lib, "clEnqueueUnmapMemObject"),
                get_image_info: Self::load_fn_opt(&lib, "clGetImageInfo"),
                get_extension_function_address: Self::load_fn_opt(
                    &lib,
                    "clGetExtensionFunctionAddress",
                ),
                lib: Some(Arc::new(lib)),
            }
        };

        info!("OpenCL loader resolved {} entry points", api.resolved_count());
        Ok(api)
    }

    /// Table backed by symbols linked into the binary.
    #[cfg(feature = "static-link")]
    pub fn linked() -> Self {
        Self {
            lib: None,
            create_context: Some(linked::clCreateContext),
            create_context_from_type: Some(linked::clCreateContextFromType),
            release_context: Some(linked::clReleaseContext),
            create_command_queue: Some(linked::clCreateCommandQueue),
            release_command_queue: Some(linked::clReleaseCommandQueue),
            build_program: Some(linked::clBuildProgram),
            release_program: Some(linked::clReleaseProgram),
            set_event_callback: Some(linked::clSetEventCallback),
            release_event: Some(linked::clReleaseEvent),
            set_mem_object_destructor_callback: Some(linked::clSetMemObjectDestructorCallback),
            release_mem_object: Some(linked::clReleaseMemObject),
            enqueue_map_buffer: Some(linked::clEnqueueMapBuffer),
            enqueue_map_image: Some(linked::clEnqueueMapImage),
            enqueue_unmap_mem_object: Some(linked::clEnqueueUnmapMemObject),
            get_image_info: Some(linked::clGetImageInfo),
            get_extension_function_address: Some(linked::clGetExtensionFunctionAddress),
        }
    }

    /// Returns true when the table was filled from a runtime-loaded library.
    pub fn is_dynamic(&self) -> bool {
        self.lib.is_some()
    }

    pub fn resolved_count(&self) -> usize {
        [
            self.create_context.is_some(),
            self.create_context_from_type.is_some(),
            self.release_context.is_some(),
            self.create_command_queue.is_some(),
            self.release_command_queue.is_some(),
            self.build_program.is_some(),
            self.release_program.is_some(),
            self.set_event_callback.is_some(),
            self.release_event.is_some(),
            self.set_mem_object_destructor_callback.is_some(),
            self.release_mem_object.is_some(),
            self.enqueue_map_buffer.is_some(),
            self.enqueue_map_image.is_some(),
            self.enqueue_unmap_mem_object.is_some(),
            self.get_image_info.is_some(),
            self.get_extension_function_address.is_some(),
        ]
        .into_iter()
        .filter(|resolved| *resolved)
        .count()
    }

    fn load_library(paths: &[String]) -> Result<Library, BridgeError> {
        let defaults = clbridge_common::platform::default_opencl_library_names();
        let names: Vec<&str> = if paths.is_empty() {
            defaults.to_vec()
        } else {
            paths.iter().map(String::as_str).collect()
        };

        let mut last_err = String::new();
        for name in names {
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!("loaded OpenCL from: {}", name);
                    return Ok(lib);
                }
                Err(e) => {
                    last_err = format!("{}: {}", name, e);
                    debug!("failed to load {}: {}", name, e);
                }
            }
        }

        Err(BridgeError::LibraryLoad(last_err))
    }

    unsafe fn load_fn_opt<F: Copy>(lib: &Library, name: &str) -> Option<F> {
        let sym: Option<Symbol<F>> = unsafe { lib.get(name.as_bytes()).ok() };
        if sym.is_none() {
            debug!("{} not exported by loader", name);
        }
        sym.map(|s| *s)
    }
}

/// Look up a table entry, failing the way every entry point does when the
/// driver lacks the function.
pub(crate) fn require<F: Copy>(f: Option<F>, name: &'static str) -> Result<F, BridgeError> {
    f.ok_or(BridgeError::FunctionUnavailable(name))
}

#[cfg(feature = "static-link")]
#[allow(non_snake_case)]
mod linked {
    use super::*;

    #[link(name = "OpenCL")]
    extern "system" {
        pub fn clCreateContext(
            properties: *const isize,
            num_devices: ClUint,
            devices: *const ClDeviceId,
            pfn_notify: Option<ContextNotifyFn>,
            user_data: *mut c_void,
            errcode_ret: *mut ClInt,
        ) -> ClContext;
        pub fn clCreateContextFromType(
            properties: *const isize,
            device_type: ClBitfield,
            pfn_notify: Option<ContextNotifyFn>,
            user_data: *mut c_void,
            errcode_ret: *mut ClInt,
        ) -> ClContext;
        pub fn clReleaseContext(context: ClContext) -> ClInt;
        pub fn clCreateCommandQueue(
            context: ClContext,
            device: ClDeviceId,
            properties: ClBitfield,
            errcode_ret: *mut ClInt,
        ) -> ClCommandQueue;
        pub fn clReleaseCommandQueue(queue: ClCommandQueue) -> ClInt;
        pub fn clBuildProgram(
            program: ClProgram,
            num_devices: ClUint,
            device_list: *const ClDeviceId,
            options: *const c_char,
            pfn_notify: Option<BuildNotifyFn>,
            user_data: *mut c_void,
        ) -> ClInt;
        pub fn clReleaseProgram(program: ClProgram) -> ClInt;
        pub fn clSetEventCallback(
            event: ClEvent,
            command_exec_callback_type: ClInt,
            pfn_notify: Option<EventNotifyFn>,
            user_data: *mut c_void,
        ) -> ClInt;
        pub fn clReleaseEvent(event: ClEvent) -> ClInt;
        pub fn clSetMemObjectDestructorCallback(
            memobj: ClMem,
            pfn_notify: Option<MemDestructorFn>,
            user_data: *mut c_void,
        ) -> ClInt;
        pub fn clReleaseMemObject(memobj: ClMem) -> ClInt;
        pub fn clEnqueueMapBuffer(
            queue: ClCommandQueue,
            buffer: ClMem,
            blocking_map: ClUint,
            map_flags: ClBitfield,
            offset: usize,
            size: usize,
            num_events_in_wait_list: ClUint,
            event_wait_list: *const ClEvent,
            event: *mut ClEvent,
            errcode_ret: *mut ClInt,
        ) -> *mut c_void;
        pub fn clEnqueueMapImage(
            queue: ClCommandQueue,
            image: ClMem,
            blocking_map: ClUint,
            map_flags: ClBitfield,
            origin: *const usize,
            region: *const usize,
            image_row_pitch: *mut usize,
            image_slice_pitch: *mut usize,
            num_events_in_wait_list: ClUint,
            event_wait_list: *const ClEvent,
            event: *mut ClEvent,
            errcode_ret: *mut ClInt,
        ) -> *mut c_void;
        pub fn clEnqueueUnmapMemObject(
            queue: ClCommandQueue,
            memobj: ClMem,
            mapped_ptr: *mut c_void,
            num_events_in_wait_list: ClUint,
            event_wait_list: *const ClEvent,
            event: *mut ClEvent,
        ) -> ClInt;
        pub fn clGetImageInfo(
            image: ClMem,
            param_name: ClUint,
            param_value_size: usize,
            param_value: *mut c_void,
            param_value_size_ret: *mut usize,
        ) -> ClInt;
        pub fn clGetExtensionFunctionAddress(func_name: *const c_char) -> *mut c_void;
    }
}
