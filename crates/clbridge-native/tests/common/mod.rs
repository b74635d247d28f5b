#![allow(dead_code)]

//! Test doubles: a recording managed runtime and a scriptable fake driver.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use clbridge_core::{
    AttachState, GlobalRef, ManagedRuntime, ManagedValue, MethodId, ObjectRef, RuntimeError,
};
use clbridge_native::cl_api::*;

// ── Managed runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Long(i64),
    Int(i32),
    Str(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Attach(AttachState),
    Detach,
    NewGlobal(usize),
    DeleteGlobal(usize),
    Invoke { target: usize, method: String, args: Vec<Arg> },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub thread: ThreadId,
    pub call: Call,
}

pub type InvokeHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type AttachHook = Box<dyn FnOnce() + Send>;

static NEXT_OBJECT: AtomicUsize = AtomicUsize::new(0x10_0000);

/// Records every call the bridge makes into the runtime, in order.
#[derive(Default)]
pub struct MockRuntime {
    events: Mutex<Vec<Event>>,
    attached: Mutex<HashSet<ThreadId>>,
    next_global: AtomicUsize,
    // global -> object token
    globals: Mutex<HashMap<usize, usize>>,
    buffers: Mutex<HashMap<usize, usize>>,
    strings: Mutex<HashMap<usize, CString>>,
    methods: Mutex<Vec<String>>,
    unresolvable: Mutex<HashSet<String>>,
    fail_attach: AtomicBool,
    fail_invocations: AtomicBool,
    fail_global_refs: AtomicBool,
    invoke_hook: Mutex<Option<InvokeHook>>,
    attach_hook: Mutex<Option<AttachHook>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runtime on which the named methods cannot be resolved.
    pub fn without_methods(names: &[&str]) -> Arc<Self> {
        let runtime = Self::default();
        runtime
            .unresolvable
            .lock()
            .extend(names.iter().map(|n| n.to_string()));
        Arc::new(runtime)
    }

    pub fn as_dyn(self: &Arc<Self>) -> Arc<dyn ManagedRuntime> {
        Arc::clone(self) as Arc<dyn ManagedRuntime>
    }

    /// A fresh managed object.
    pub fn object(&self) -> ObjectRef {
        let token = NEXT_OBJECT.fetch_add(0x10, Ordering::Relaxed);
        ObjectRef::from_raw(token as *mut c_void).unwrap()
    }

    /// A direct buffer over `memory`.
    pub fn direct_buffer<T>(&self, memory: &mut [T]) -> ObjectRef {
        let object = self.object();
        self.buffers
            .lock()
            .insert(object.as_raw() as usize, memory.as_mut_ptr() as usize);
        object
    }

    pub fn string(&self, value: &str) -> ObjectRef {
        let object = self.object();
        self.strings
            .lock()
            .insert(object.as_raw() as usize, CString::new(value).unwrap());
        object
    }

    /// Mark the calling thread as already known to the runtime.
    pub fn mark_attached(&self) {
        self.attached.lock().insert(thread::current().id());
    }

    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_invocations(&self, fail: bool) {
        self.fail_invocations.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_global_refs(&self, fail: bool) {
        self.fail_global_refs.store(fail, Ordering::SeqCst);
    }

    pub fn set_invoke_hook(&self, hook: InvokeHook) {
        *self.invoke_hook.lock() = Some(hook);
    }

    /// Run `hook` once, at the start of the next attach request.
    pub fn set_attach_hook(&self, hook: AttachHook) {
        *self.attach_hook.lock() = Some(hook);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Calls concerning one managed object, in order.
    pub fn calls_for(&self, object: ObjectRef) -> Vec<Call> {
        let token = object.as_raw() as usize;
        self.events
            .lock()
            .iter()
            .filter(|e| match &e.call {
                Call::NewGlobal(t) | Call::DeleteGlobal(t) => *t == token,
                Call::Invoke { target, .. } => *target == token,
                _ => false,
            })
            .map(|e| e.call.clone())
            .collect()
    }

    pub fn invocations_for(&self, object: ObjectRef) -> Vec<Vec<Arg>> {
        self.calls_for(object)
            .into_iter()
            .filter_map(|c| match c {
                Call::Invoke { args, .. } => Some(args),
                _ => None,
            })
            .collect()
    }

    /// Every call made on `thread`, in order.
    pub fn calls_on(&self, thread: ThreadId) -> Vec<Call> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.thread == thread)
            .map(|e| e.call.clone())
            .collect()
    }

    pub fn live_globals(&self) -> usize {
        self.globals.lock().len()
    }

    fn record(&self, call: Call) {
        self.events.lock().push(Event { thread: thread::current().id(), call });
    }
}

impl ManagedRuntime for MockRuntime {
    fn attach_current_thread(&self) -> Result<AttachState, RuntimeError> {
        let hook = self.attach_hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(RuntimeError::AttachFailed("runtime is shutting down".into()));
        }
        let state = if self.attached.lock().insert(thread::current().id()) {
            AttachState::Attached
        } else {
            AttachState::AlreadyAttached
        };
        self.record(Call::Attach(state));
        Ok(state)
    }

    fn detach_current_thread(&self) {
        self.attached.lock().remove(&thread::current().id());
        self.record(Call::Detach);
    }

    fn new_global_ref(&self, object: ObjectRef) -> Option<GlobalRef> {
        if self.fail_global_refs.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_global.fetch_add(1, Ordering::Relaxed) + 1;
        let token = object.as_raw() as usize;
        self.globals.lock().insert(id, token);
        self.record(Call::NewGlobal(token));
        GlobalRef::from_raw(id as *mut c_void)
    }

    fn delete_global_ref(&self, global: GlobalRef) {
        let token = self.globals.lock().remove(&(global.as_raw() as usize));
        if let Some(token) = token {
            self.record(Call::DeleteGlobal(token));
        }
    }

    fn direct_buffer_address(&self, buffer: ObjectRef) -> *mut c_void {
        self.buffers
            .lock()
            .get(&(buffer.as_raw() as usize))
            .map_or(std::ptr::null_mut(), |&addr| addr as *mut c_void)
    }

    fn utf8_string(&self, string: ObjectRef) -> Option<CString> {
        self.strings.lock().get(&(string.as_raw() as usize)).cloned()
    }

    fn resolve_method(&self, _class: &str, name: &str, _signature: &str) -> Option<MethodId> {
        if self.unresolvable.lock().contains(name) {
            return None;
        }
        let mut methods = self.methods.lock();
        methods.push(name.to_string());
        MethodId::from_raw(methods.len() as *mut c_void)
    }

    fn call_void_method(
        &self,
        target: GlobalRef,
        method: MethodId,
        args: &[ManagedValue<'_>],
    ) -> Result<(), RuntimeError> {
        let method = self.methods.lock()[method.as_raw() as usize - 1].clone();
        let target = self
            .globals
            .lock()
            .get(&(target.as_raw() as usize))
            .copied()
            .unwrap_or_else(|| panic!("{} invoked through a deleted global ref", method));

        let hook = self.invoke_hook.lock().clone();
        if let Some(hook) = hook {
            hook(&method);
        }

        let args = args
            .iter()
            .map(|a| match a {
                ManagedValue::Long(v) => Arg::Long(*v),
                ManagedValue::Int(v) => Arg::Int(*v),
                ManagedValue::Str(s) => Arg::Str(s.to_string_lossy().into_owned()),
                ManagedValue::Null => Arg::Null,
            })
            .collect();
        self.record(Call::Invoke { target, method, args });

        if self.fail_invocations.load(Ordering::SeqCst) {
            return Err(RuntimeError::InvocationFailed("callback threw".into()));
        }
        Ok(())
    }

    fn new_direct_buffer(&self, address: *mut c_void, _capacity: usize) -> Option<ObjectRef> {
        let object = self.object();
        self.buffers.lock().insert(object.as_raw() as usize, address as usize);
        Some(object)
    }
}

// ── Fake driver ────────────────────────────────────────────────────────

pub const FAKE_QUEUE: usize = 0xC1_0000;

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(0xC0_0000);

/// Scripted behaviour of the fake driver plus what it observed. Lives per
/// test thread; the bridge calls the driver synchronously on that thread.
#[derive(Debug, Default, Clone)]
pub struct DriverState {
    pub status: ClInt,
    pub calls: usize,
    /// Handle a successful context creation returns.
    pub context: usize,
    pub context_notify: Option<(ContextNotifyFn, usize)>,
    pub build_notify: Option<(BuildNotifyFn, usize)>,
    pub event_notify: Option<(EventNotifyFn, usize)>,
    pub mem_notify: Option<(MemDestructorFn, usize)>,
    pub had_notify: bool,
    pub options: Option<String>,
    pub devices: usize,
    pub released: Vec<usize>,
    pub map_target: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
    pub element_size: usize,
    pub depth: usize,
    pub failing_info: Option<ClUint>,
    pub unmapped: Vec<usize>,
}

thread_local! {
    static DRIVER: RefCell<DriverState> = RefCell::new(DriverState::default());
}

/// Fresh driver state with a context handle no other test is given.
pub fn reset_driver() {
    let context = NEXT_CONTEXT.fetch_add(0x100, Ordering::Relaxed);
    DRIVER.with(|d| *d.borrow_mut() = DriverState { context, ..DriverState::default() });
}

pub fn driver() -> DriverState {
    DRIVER.with(|d| d.borrow().clone())
}

pub fn script_driver(f: impl FnOnce(&mut DriverState)) {
    DRIVER.with(|d| f(&mut d.borrow_mut()));
}

fn observe<R>(f: impl FnOnce(&mut DriverState) -> R) -> R {
    DRIVER.with(|d| {
        let mut d = d.borrow_mut();
        d.calls += 1;
        f(&mut d)
    })
}

unsafe fn write_errcode(errcode: *mut ClInt, status: ClInt) {
    if !errcode.is_null() {
        unsafe { *errcode = status };
    }
}

pub unsafe extern "system" fn fake_create_context(
    _properties: *const isize,
    _num_devices: ClUint,
    devices: *const ClDeviceId,
    pfn_notify: Option<ContextNotifyFn>,
    user_data: *mut c_void,
    errcode_ret: *mut ClInt,
) -> ClContext {
    let (status, context) = observe(|d| {
        d.devices = devices as usize;
        d.had_notify = pfn_notify.is_some();
        d.context_notify = pfn_notify.map(|f| (f, user_data as usize));
        (d.status, d.context)
    });
    unsafe { write_errcode(errcode_ret, status) };
    if status == CL_SUCCESS {
        context as ClContext
    } else {
        std::ptr::null_mut()
    }
}

pub unsafe extern "system" fn fake_create_context_from_type(
    _properties: *const isize,
    _device_type: ClBitfield,
    pfn_notify: Option<ContextNotifyFn>,
    user_data: *mut c_void,
    errcode_ret: *mut ClInt,
) -> ClContext {
    unsafe {
        fake_create_context(
            std::ptr::null(),
            0,
            std::ptr::null(),
            pfn_notify,
            user_data,
            errcode_ret,
        )
    }
}

pub unsafe extern "system" fn fake_release(object: *mut c_void) -> ClInt {
    observe(|d| {
        d.released.push(object as usize);
        d.status
    })
}

pub unsafe extern "system" fn fake_create_command_queue(
    _context: ClContext,
    _device: ClDeviceId,
    _properties: ClBitfield,
    errcode_ret: *mut ClInt,
) -> ClCommandQueue {
    let status = observe(|d| d.status);
    unsafe { write_errcode(errcode_ret, status) };
    FAKE_QUEUE as ClCommandQueue
}

pub unsafe extern "system" fn fake_build_program(
    _program: ClProgram,
    _num_devices: ClUint,
    device_list: *const ClDeviceId,
    options: *const c_char,
    pfn_notify: Option<BuildNotifyFn>,
    user_data: *mut c_void,
) -> ClInt {
    let options = (!options.is_null())
        .then(|| unsafe { CStr::from_ptr(options) }.to_string_lossy().into_owned());
    observe(|d| {
        d.devices = device_list as usize;
        d.options = options;
        d.had_notify = pfn_notify.is_some();
        d.build_notify = pfn_notify.map(|f| (f, user_data as usize));
        d.status
    })
}

pub unsafe extern "system" fn fake_set_event_callback(
    _event: ClEvent,
    _trigger: ClInt,
    pfn_notify: Option<EventNotifyFn>,
    user_data: *mut c_void,
) -> ClInt {
    observe(|d| {
        d.had_notify = pfn_notify.is_some();
        d.event_notify = pfn_notify.map(|f| (f, user_data as usize));
        d.status
    })
}

pub unsafe extern "system" fn fake_set_mem_destructor(
    _memobj: ClMem,
    pfn_notify: Option<MemDestructorFn>,
    user_data: *mut c_void,
) -> ClInt {
    observe(|d| {
        d.had_notify = pfn_notify.is_some();
        d.mem_notify = pfn_notify.map(|f| (f, user_data as usize));
        d.status
    })
}

pub unsafe extern "system" fn fake_map_buffer(
    _queue: ClCommandQueue,
    _buffer: ClMem,
    _blocking: ClUint,
    _flags: ClBitfield,
    _offset: usize,
    _size: usize,
    _num_events: ClUint,
    _wait_list: *const ClEvent,
    _event: *mut ClEvent,
    errcode_ret: *mut ClInt,
) -> *mut c_void {
    let (status, target) = observe(|d| (d.status, d.map_target));
    unsafe { write_errcode(errcode_ret, status) };
    target as *mut c_void
}

pub unsafe extern "system" fn fake_map_image(
    _queue: ClCommandQueue,
    _image: ClMem,
    _blocking: ClUint,
    _flags: ClBitfield,
    _origin: *const usize,
    _region: *const usize,
    row_pitch: *mut usize,
    slice_pitch: *mut usize,
    _num_events: ClUint,
    _wait_list: *const ClEvent,
    _event: *mut ClEvent,
    errcode_ret: *mut ClInt,
) -> *mut c_void {
    let state = observe(|d| d.clone());
    unsafe {
        write_errcode(errcode_ret, state.status);
        if !row_pitch.is_null() {
            *row_pitch = state.row_pitch;
        }
        if !slice_pitch.is_null() {
            *slice_pitch = state.slice_pitch;
        }
    }
    state.map_target as *mut c_void
}

pub unsafe extern "system" fn fake_get_image_info(
    _image: ClMem,
    param_name: ClUint,
    param_value_size: usize,
    param_value: *mut c_void,
    _param_value_size_ret: *mut usize,
) -> ClInt {
    let state = driver();
    if state.failing_info == Some(param_name) {
        return -30; // CL_INVALID_VALUE
    }
    let value = match param_name {
        CL_IMAGE_ELEMENT_SIZE => state.element_size,
        CL_IMAGE_DEPTH => state.depth,
        _ => return -30,
    };
    assert_eq!(param_value_size, std::mem::size_of::<usize>());
    unsafe { *param_value.cast::<usize>() = value };
    CL_SUCCESS
}

pub unsafe extern "system" fn fake_unmap(
    _queue: ClCommandQueue,
    _memobj: ClMem,
    mapped_ptr: *mut c_void,
    _num_events: ClUint,
    _wait_list: *const ClEvent,
    _event: *mut ClEvent,
) -> ClInt {
    observe(|d| {
        d.unmapped.push(mapped_ptr as usize);
        d.status
    })
}

pub unsafe extern "system" fn fake_get_extension_function_address(
    name: *const c_char,
) -> *mut c_void {
    match unsafe { CStr::from_ptr(name) }.to_bytes() {
        b"clIcdGetPlatformIDsKHR" => 0xE0_0000 as *mut c_void,
        _ => std::ptr::null_mut(),
    }
}

/// Function table backed entirely by the fake driver.
pub fn fake_api() -> ClApi {
    let mut api = ClApi::empty();
    api.create_context = Some(fake_create_context);
    api.create_context_from_type = Some(fake_create_context_from_type);
    api.release_context = Some(fake_release);
    api.create_command_queue = Some(fake_create_command_queue);
    api.release_command_queue = Some(fake_release);
    api.build_program = Some(fake_build_program);
    api.release_program = Some(fake_release);
    api.set_event_callback = Some(fake_set_event_callback);
    api.release_event = Some(fake_release);
    api.set_mem_object_destructor_callback = Some(fake_set_mem_destructor);
    api.release_mem_object = Some(fake_release);
    api.enqueue_map_buffer = Some(fake_map_buffer);
    api.enqueue_map_image = Some(fake_map_image);
    api.enqueue_unmap_mem_object = Some(fake_unmap);
    api.get_image_info = Some(fake_get_image_info);
    api.get_extension_function_address = Some(fake_get_extension_function_address);
    api
}

/// Run `f` on a fresh thread standing in for a driver worker.
pub fn on_driver_thread<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> (ThreadId, R) {
    let handle = thread::spawn(move || (thread::current().id(), f()));
    handle.join().unwrap()
}
