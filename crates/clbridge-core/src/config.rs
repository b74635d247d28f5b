use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::kind::CallbackKind;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CLBRIDGE_CONFIG";

/// Top-level bridge configuration, loaded from clbridge.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub callbacks: CallbackConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// OpenCL loader libraries to try in order (empty = platform defaults)
    #[serde(default)]
    pub paths: Vec<String>,
}

/// What to do with a callback kind whose managed method could not be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Entry points given a target for the kind fail before the native call.
    #[default]
    Fail,
    /// The target is dropped with a warning and the native call proceeds
    /// without a callback.
    Ignore,
}

/// Managed method a callback kind is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub class: String,
    pub method: String,
    pub signature: String,
}

impl MethodSpec {
    fn new(class: &str, method: &str, signature: &str) -> Self {
        Self {
            class: class.to_string(),
            method: method.to_string(),
            signature: signature.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,
    #[serde(default = "default_context_error")]
    pub context_error: MethodSpec,
    #[serde(default = "default_build_finished")]
    pub build_finished: MethodSpec,
    #[serde(default = "default_event_status")]
    pub event_status: MethodSpec,
    #[serde(default = "default_mem_destroyed")]
    pub mem_destroyed: MethodSpec,
}

impl CallbackConfig {
    pub fn method_for(&self, kind: CallbackKind) -> &MethodSpec {
        match kind {
            CallbackKind::ContextError => &self.context_error,
            CallbackKind::ProgramBuildFinished => &self.build_finished,
            CallbackKind::EventStatusChanged => &self.event_status,
            CallbackKind::MemoryObjectDestroyed => &self.mem_destroyed,
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            on_unresolved: UnresolvedPolicy::default(),
            context_error: default_context_error(),
            build_finished: default_build_finished(),
            event_status: default_event_status(),
            mem_destroyed: default_mem_destroyed(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, BridgeError> {
        toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(BridgeError::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Returns the config file path.
/// Search order:
/// 1. `$CLBRIDGE_CONFIG`
/// 2. System-wide config: `%PROGRAMDATA%\clbridge\clbridge.toml` (Windows) or `/etc/clbridge/clbridge.toml`
/// 3. Local fallback: `./clbridge.toml`
pub fn default_config_path() -> String {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return path;
    }
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = format!(r"{}\clbridge\clbridge.toml", programdata);
        if std::path::Path::new(&system_path).exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = "/etc/clbridge/clbridge.toml";
        if std::path::Path::new(system_path).exists() {
            return system_path.to_string();
        }
    }
    "clbridge.toml".to_string()
}

fn default_context_error() -> MethodSpec {
    MethodSpec::new(
        "clbridge/ContextErrorHandler",
        "onError",
        "(Ljava/lang/String;Ljava/nio/ByteBuffer;J)V",
    )
}

fn default_build_finished() -> MethodSpec {
    MethodSpec::new("clbridge/BuildProgramCallback", "buildFinished", "(J)V")
}

fn default_event_status() -> MethodSpec {
    MethodSpec::new("clbridge/EventCallback", "eventStateChanged", "(JI)V")
}

fn default_mem_destroyed() -> MethodSpec {
    MethodSpec::new("clbridge/MemObjectDestructorCallback", "memoryDeallocated", "(J)V")
}
