//! Backend configuration and validation layer reporting types

/// Backend creation options
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Enable validation/debug layers (needs the `vulkan-validation` feature of the backend)
    pub enable_validation: bool,
    /// Which validation messages are forwarded to the engine logger
    pub debug_severity: DebugSeverity,
    /// Count validation messages per severity
    pub enable_validation_stats: bool,
    /// Request the ray tracing extensions when the device exposes them
    pub enable_ray_tracing: bool,
    /// Forward object names to debugging tools
    pub enable_object_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Engine Application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            enable_validation_stats: false,
            enable_ray_tracing: false,
            enable_object_names: cfg!(debug_assertions),
        }
    }
}

/// Validation message filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Validation message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}
