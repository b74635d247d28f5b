use std::fmt;

/// The closed set of native notifications the bridge forwards to managed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Context error report. May fire any number of times while the context lives.
    ContextError,
    /// Program build completion. Fires once.
    ProgramBuildFinished,
    /// Event reached the trigger status it was registered for. Fires once.
    EventStatusChanged,
    /// Memory object was destroyed. Fires once.
    MemoryObjectDestroyed,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 4] = [
        CallbackKind::ContextError,
        CallbackKind::ProgramBuildFinished,
        CallbackKind::EventStatusChanged,
        CallbackKind::MemoryObjectDestroyed,
    ];

    /// Single-fire registrations release their keep-alive reference right
    /// after the one invocation; multi-fire ones live until their owning
    /// handle is released.
    pub fn is_single_fire(self) -> bool {
        !matches!(self, CallbackKind::ContextError)
    }

    /// Dense index, used to key per-kind tables.
    pub fn index(self) -> usize {
        match self {
            CallbackKind::ContextError => 0,
            CallbackKind::ProgramBuildFinished => 1,
            CallbackKind::EventStatusChanged => 2,
            CallbackKind::MemoryObjectDestroyed => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CallbackKind::ContextError => "context-error",
            CallbackKind::ProgramBuildFinished => "program-build-finished",
            CallbackKind::EventStatusChanged => "event-status-changed",
            CallbackKind::MemoryObjectDestroyed => "memory-object-destroyed",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
