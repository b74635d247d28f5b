//! Keep-alive registrations for managed callback targets.
//!
//! A registration pins a managed target with a global reference and is
//! addressed by an opaque id the driver carries as its `user_data`. The id is
//! looked up on every firing, so a stale or repeated firing finds nothing
//! instead of touching freed memory.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use clbridge_core::config::{CallbackConfig, UnresolvedPolicy};
use clbridge_core::handle::ManagedHandle;
use clbridge_core::{
    BridgeError, CallbackKind, GlobalRef, ManagedRuntime, ManagedValue, MethodId, ObjectRef,
    RuntimeError,
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0x1000);

static REGISTRATIONS: OnceLock<DashMap<usize, Arc<Registration>>> = OnceLock::new();

fn registrations() -> &'static DashMap<usize, Arc<Registration>> {
    REGISTRATIONS.get_or_init(DashMap::new)
}

fn alloc_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A pinned managed target. Dropping the last reference deletes the global
/// reference, so callers must drop it on a thread attached to the runtime.
pub(crate) struct Registration {
    id: usize,
    kind: CallbackKind,
    runtime: Arc<dyn ManagedRuntime>,
    target: GlobalRef,
    method: MethodId,
}

impl Registration {
    pub(crate) fn kind(&self) -> CallbackKind {
        self.kind
    }

    pub(crate) fn invoke(&self, args: &[ManagedValue<'_>]) -> Result<(), RuntimeError> {
        self.runtime.call_void_method(self.target, self.method, args)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.runtime.delete_global_ref(self.target);
        trace!("released {} keep-alive {:#x}", self.kind, self.id);
    }
}

/// Runtime a registration belongs to. Never hands out the registration
/// itself, so a caller not yet attached cannot end up dropping it.
pub(crate) fn runtime_of(id: usize) -> Option<Arc<dyn ManagedRuntime>> {
    registrations().get(&id).map(|r| Arc::clone(&r.value().runtime))
}

pub(crate) fn lookup(id: usize) -> Option<Arc<Registration>> {
    registrations().get(&id).map(|r| Arc::clone(r.value()))
}

pub(crate) fn take(id: usize) -> Option<Arc<Registration>> {
    registrations().remove(&id).map(|(_, r)| r)
}

/// Owned claim on a fresh registration, held by an entry point between
/// registering and learning whether the native call accepted it.
///
/// It must be consumed exactly once: [`KeepAlive::discard`] when the native
/// call failed, [`KeepAlive::hand_to_driver`] when it succeeded. Dropping it
/// unconsumed discards.
#[must_use = "a keep-alive must be discarded or handed to the driver"]
#[derive(Debug)]
pub struct KeepAlive {
    id: usize,
    kind: CallbackKind,
}

impl KeepAlive {
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Opaque value passed to the native call as its `user_data`.
    pub fn user_data(&self) -> *mut c_void {
        self.id as *mut c_void
    }

    /// The native call failed; the driver never saw the target.
    pub fn discard(self) {
        drop(self);
    }

    /// The native call succeeded; the driver now owns the registration until
    /// it fires (single-fire) or its handle is released (multi-fire).
    pub fn hand_to_driver(self) -> usize {
        let id = self.id;
        trace!("{} keep-alive {:#x} handed to driver", self.kind, id);
        std::mem::forget(self);
        id
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if take(self.id).is_some() {
            debug!("discarded {} keep-alive {:#x}", self.kind, self.id);
        }
    }
}

/// Managed method identifiers, one slot per callback kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackMethods {
    methods: [Option<MethodId>; 4],
}

impl CallbackMethods {
    /// Resolve every kind's method once. Unresolved kinds stay disabled.
    pub fn resolve(runtime: &dyn ManagedRuntime, config: &CallbackConfig) -> Self {
        let mut methods = Self::default();
        for kind in CallbackKind::ALL {
            let spec = config.method_for(kind);
            let id = runtime.resolve_method(&spec.class, &spec.method, &spec.signature);
            if id.is_none() {
                warn!(
                    "{} callbacks disabled: cannot resolve {}.{}{}",
                    kind, spec.class, spec.method, spec.signature
                );
            }
            methods.set(kind, id);
        }
        methods
    }

    pub fn get(&self, kind: CallbackKind) -> Option<MethodId> {
        self.methods[kind.index()]
    }

    pub fn set(&mut self, kind: CallbackKind, method: Option<MethodId>) {
        self.methods[kind.index()] = method;
    }
}

/// Creates registrations for one managed runtime and owns the context
/// bindings made through it.
pub struct CallbackRegistry {
    runtime: Arc<dyn ManagedRuntime>,
    methods: CallbackMethods,
    policy: UnresolvedPolicy,
    /// Context handle -> id of its error-handler registration.
    context_handlers: DashMap<ManagedHandle, usize>,
}

impl CallbackRegistry {
    pub fn new(
        runtime: Arc<dyn ManagedRuntime>,
        methods: CallbackMethods,
        policy: UnresolvedPolicy,
    ) -> Self {
        Self {
            runtime,
            methods,
            policy,
            context_handlers: DashMap::new(),
        }
    }

    pub fn from_config(runtime: Arc<dyn ManagedRuntime>, config: &CallbackConfig) -> Self {
        let methods = CallbackMethods::resolve(runtime.as_ref(), config);
        Self::new(runtime, methods, config.on_unresolved)
    }

    pub fn runtime(&self) -> &dyn ManagedRuntime {
        self.runtime.as_ref()
    }

    pub fn is_available(&self, kind: CallbackKind) -> bool {
        self.methods.get(kind).is_some()
    }

    /// Pin `target` for a callback of `kind`.
    ///
    /// Returns `Ok(None)` when there is nothing to register: no target was
    /// given, or the kind is disabled under [`UnresolvedPolicy::Ignore`].
    pub fn register(
        &self,
        kind: CallbackKind,
        target: Option<ObjectRef>,
    ) -> Result<Option<KeepAlive>, BridgeError> {
        let Some(target) = target else {
            return Ok(None);
        };
        let Some(method) = self.methods.get(kind) else {
            return match self.policy {
                UnresolvedPolicy::Fail => Err(BridgeError::CallbackUnavailable(kind)),
                UnresolvedPolicy::Ignore => {
                    warn!("{} callback dropped: kind is disabled", kind);
                    Ok(None)
                }
            };
        };
        let global = self
            .runtime
            .new_global_ref(target)
            .ok_or(BridgeError::KeepAliveFailed(kind))?;

        let id = alloc_id();
        registrations().insert(
            id,
            Arc::new(Registration {
                id,
                kind,
                runtime: Arc::clone(&self.runtime),
                target: global,
                method,
            }),
        );
        trace!("registered {} keep-alive {:#x}", kind, id);
        Ok(Some(KeepAlive { id, kind }))
    }

    /// Tie a context-error registration to the context it was created for.
    ///
    /// Any other kind is rejected and its token discarded.
    pub fn bind_context(
        &self,
        context: ManagedHandle,
        token: KeepAlive,
    ) -> Result<(), BridgeError> {
        if token.kind() != CallbackKind::ContextError {
            let kind = token.kind();
            token.discard();
            return Err(BridgeError::NotContextHandler(kind));
        }
        let id = token.hand_to_driver();
        if let Some(previous) = self.context_handlers.insert(context, id) {
            warn!("context {:#x} was already bound to handler {:#x}", context, previous);
            take(previous);
        }
        Ok(())
    }

    /// Release the error handler of a context the caller has released.
    /// Returns false when the context had none.
    pub fn release_context(&self, context: ManagedHandle) -> bool {
        match self.context_handlers.remove(&context) {
            Some((_, id)) => {
                take(id);
                true
            }
            None => false,
        }
    }

    pub fn has_context_handler(&self, context: ManagedHandle) -> bool {
        self.context_handlers.contains_key(&context)
    }
}
