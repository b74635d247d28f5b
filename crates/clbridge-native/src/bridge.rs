use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::info;

use clbridge_core::config::BridgeConfig;
use clbridge_core::handle::ManagedHandle;
use clbridge_core::{BridgeError, BufferRef, ManagedRuntime, ObjectRef};

use crate::callbacks::CallbackRegistry;
use crate::cl_api::{require, ClApi, ClBitfield, ClInt, ClUint};
use crate::entry;
use crate::view::MappedView;

/// A loaded function table paired with the callback registry of one managed
/// runtime.
///
/// Every method looks its native function up in the table first and fails
/// with [`BridgeError::FunctionUnavailable`] before touching any argument
/// when the loader does not export it.
pub struct Bridge {
    api: ClApi,
    callbacks: CallbackRegistry,
}

impl Bridge {
    /// Load the OpenCL loader named by `config` and resolve the callback
    /// methods of `runtime`.
    pub fn load(
        runtime: Arc<dyn ManagedRuntime>,
        config: &BridgeConfig,
    ) -> Result<Self, BridgeError> {
        clbridge_common::logging::try_init_logging();
        info!("clbridge loading on {}", clbridge_common::platform::platform_name());

        let api = ClApi::load(&config.library.paths)?;
        Ok(Self::new(api, runtime, config))
    }

    pub fn new(api: ClApi, runtime: Arc<dyn ManagedRuntime>, config: &BridgeConfig) -> Self {
        let callbacks = CallbackRegistry::from_config(runtime, &config.callbacks);
        Self { api, callbacks }
    }

    pub fn api(&self) -> &ClApi {
        &self.api
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    fn runtime(&self) -> &dyn ManagedRuntime {
        self.callbacks.runtime()
    }

    /// # Safety
    /// See [`entry::create_context`].
    pub unsafe fn create_context(
        &self,
        properties: BufferRef,
        num_devices: ClUint,
        devices: BufferRef,
        error_handler: Option<ObjectRef>,
        errcode: BufferRef,
    ) -> Result<ManagedHandle, BridgeError> {
        let f = require(self.api.create_context, "clCreateContext")?;
        unsafe {
            entry::create_context(
                f,
                &self.callbacks,
                properties,
                num_devices,
                devices,
                error_handler,
                errcode,
            )
        }
    }

    /// # Safety
    /// See [`entry::create_context_from_type`].
    pub unsafe fn create_context_from_type(
        &self,
        properties: BufferRef,
        device_type: ClBitfield,
        error_handler: Option<ObjectRef>,
        errcode: BufferRef,
    ) -> Result<ManagedHandle, BridgeError> {
        let f = require(self.api.create_context_from_type, "clCreateContextFromType")?;
        unsafe {
            entry::create_context_from_type(
                f,
                &self.callbacks,
                properties,
                device_type,
                error_handler,
                errcode,
            )
        }
    }

    /// # Safety
    /// `context` must be a live context handle.
    pub unsafe fn release_context(&self, context: ManagedHandle) -> Result<ClInt, BridgeError> {
        let f = require(self.api.release_context, "clReleaseContext")?;
        Ok(unsafe { entry::release_context(f, &self.callbacks, context) })
    }

    /// # Safety
    /// See [`entry::create_command_queue`].
    pub unsafe fn create_command_queue(
        &self,
        context: ManagedHandle,
        device: ManagedHandle,
        properties: ClBitfield,
        errcode: BufferRef,
    ) -> Result<ManagedHandle, BridgeError> {
        let f = require(self.api.create_command_queue, "clCreateCommandQueue")?;
        Ok(unsafe {
            entry::create_command_queue(f, self.runtime(), context, device, properties, errcode)
        })
    }

    /// # Safety
    /// `queue` must be a live command queue handle.
    pub unsafe fn release_command_queue(&self, queue: ManagedHandle) -> Result<ClInt, BridgeError> {
        let f = require(self.api.release_command_queue, "clReleaseCommandQueue")?;
        Ok(unsafe { entry::release_object(f, "clReleaseCommandQueue", queue) })
    }

    /// # Safety
    /// See [`entry::build_program`].
    pub unsafe fn build_program(
        &self,
        program: ManagedHandle,
        num_devices: ClUint,
        device_list: BufferRef,
        options: Option<ObjectRef>,
        listener: Option<ObjectRef>,
    ) -> Result<ClInt, BridgeError> {
        let f = require(self.api.build_program, "clBuildProgram")?;
        unsafe {
            entry::build_program(
                f,
                &self.callbacks,
                program,
                num_devices,
                device_list,
                options,
                listener,
            )
        }
    }

    /// # Safety
    /// `program` must be a live program handle.
    pub unsafe fn release_program(&self, program: ManagedHandle) -> Result<ClInt, BridgeError> {
        let f = require(self.api.release_program, "clReleaseProgram")?;
        Ok(unsafe { entry::release_object(f, "clReleaseProgram", program) })
    }

    /// # Safety
    /// `event` must be a live event handle.
    pub unsafe fn set_event_callback(
        &self,
        event: ManagedHandle,
        trigger_status: ClInt,
        listener: Option<ObjectRef>,
    ) -> Result<ClInt, BridgeError> {
        let f = require(self.api.set_event_callback, "clSetEventCallback")?;
        unsafe { entry::set_event_callback(f, &self.callbacks, event, trigger_status, listener) }
    }

    /// # Safety
    /// `event` must be a live event handle.
    pub unsafe fn release_event(&self, event: ManagedHandle) -> Result<ClInt, BridgeError> {
        let f = require(self.api.release_event, "clReleaseEvent")?;
        Ok(unsafe { entry::release_object(f, "clReleaseEvent", event) })
    }

    /// # Safety
    /// `memobj` must be a live memory object handle.
    pub unsafe fn set_mem_object_destructor_callback(
        &self,
        memobj: ManagedHandle,
        listener: Option<ObjectRef>,
    ) -> Result<ClInt, BridgeError> {
        let f = require(
            self.api.set_mem_object_destructor_callback,
            "clSetMemObjectDestructorCallback",
        )?;
        unsafe { entry::set_mem_object_destructor_callback(f, &self.callbacks, memobj, listener) }
    }

    /// # Safety
    /// `memobj` must be a live memory object handle.
    pub unsafe fn release_mem_object(&self, memobj: ManagedHandle) -> Result<ClInt, BridgeError> {
        let f = require(self.api.release_mem_object, "clReleaseMemObject")?;
        Ok(unsafe { entry::release_object(f, "clReleaseMemObject", memobj) })
    }

    /// # Safety
    /// See [`entry::enqueue_map_buffer`].
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn enqueue_map_buffer(
        &self,
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
    ) -> Result<Option<MappedView>, BridgeError> {
        let f = require(self.api.enqueue_map_buffer, "clEnqueueMapBuffer")?;
        Ok(unsafe {
            entry::enqueue_map_buffer(
                f,
                self.runtime(),
                queue,
                buffer,
                blocking,
                flags,
                offset,
                size,
                num_events,
                wait_list,
                event,
                errcode,
            )
        })
    }

    /// # Safety
    /// See [`entry::enqueue_map_image`].
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn enqueue_map_image(
        &self,
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
        let map = require(self.api.enqueue_map_image, "clEnqueueMapImage")?;
        let info = require(self.api.get_image_info, "clGetImageInfo")?;
        unsafe {
            entry::enqueue_map_image(
                map,
                info,
                self.runtime(),
                queue,
                image,
                blocking,
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
        }
    }

    /// # Safety
    /// See [`entry::enqueue_unmap_mem_object`].
    pub unsafe fn enqueue_unmap_mem_object(
        &self,
        queue: ManagedHandle,
        memobj: ManagedHandle,
        view: MappedView,
        num_events: ClUint,
        wait_list: BufferRef,
        event: BufferRef,
    ) -> Result<ClInt, BridgeError> {
        let f = require(self.api.enqueue_unmap_mem_object, "clEnqueueUnmapMemObject")?;
        Ok(unsafe {
            entry::enqueue_unmap_mem_object(
                f,
                self.runtime(),
                queue,
                memobj,
                view,
                num_events,
                wait_list,
                event,
            )
        })
    }

    /// Address of a vendor extension function.
    pub fn get_extension_function_address(
        &self,
        name: &str,
    ) -> Result<Option<NonNull<c_void>>, BridgeError> {
        let f = require(
            self.api.get_extension_function_address,
            "clGetExtensionFunctionAddress",
        )?;
        Ok(unsafe { entry::get_extension_function_address(f, name) })
    }
}
