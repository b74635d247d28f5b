use crate::kind::CallbackKind;

/// Failures reported by the managed runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to attach thread to managed runtime: {0}")]
    AttachFailed(String),

    #[error("managed method invocation failed: {0}")]
    InvocationFailed(String),
}

/// Bridge-level failures. Native statuses are passed through to the caller
/// unchanged and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("native function not available: {0}")]
    FunctionUnavailable(&'static str),

    #[error("{0} callbacks are disabled: managed method was not resolved at load")]
    CallbackUnavailable(CallbackKind),

    #[error("failed to create keep-alive reference for {0} callback")]
    KeepAliveFailed(CallbackKind),

    #[error("{0} registration cannot be bound to a context")]
    NotContextHandler(CallbackKind),

    #[error("managed string could not be read as UTF-8")]
    StringExtraction,

    #[error("image geometry query failed: {param} returned status {status}")]
    GeometryQuery { param: &'static str, status: i32 },

    #[error("mapped region size overflows the address space")]
    GeometryOverflow,

    #[error("failed to load OpenCL library: {0}")]
    LibraryLoad(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
