/// Vulkan Debug Messenger - forwards validation layer messages to the engine logger
///
/// Messages are filtered by the configured `DebugSeverity`, counted per
/// severity when statistics are enabled, and logged under the
/// "ecore::vulkan::validation" source. Identical messages are grouped so the
/// report can tell how many came back more than once.

use ash::vk;
use colored::*;
use engine_core::ecore::log::LogSeverity;
use engine_core::ecore::render::{DebugSeverity, ValidationStats};
use rustc_hash::FxHashMap;
use std::sync::Mutex;

pub(crate) const VALIDATION_SOURCE: &str = "ecore::vulkan::validation";

/// Filter, counters and repeat tracking, installed while a messenger exists
static VALIDATION: Mutex<Option<ValidationState>> = Mutex::new(None);

/// Counters kept after the messenger is gone, so the report still works
static LAST_STATS: Mutex<ValidationStats> = Mutex::new(ValidationStats {
    errors: 0,
    warnings: 0,
    info: 0,
    verbose: 0,
});

#[derive(Debug, Clone, Copy)]
pub(crate) struct DebugConfig {
    pub severity: DebugSeverity,
    pub enable_stats: bool,
}

struct ValidationState {
    config: DebugConfig,
    stats: ValidationStats,
    /// Occurrences per message text
    seen: FxHashMap<String, u32>,
}

impl ValidationState {
    fn new(config: DebugConfig) -> Self {
        Self {
            config,
            stats: ValidationStats::default(),
            seen: FxHashMap::default(),
        }
    }

    /// Count one forwarded message; returns how many times its text was seen
    fn record(&mut self, severity: LogSeverity, message: &str) -> u32 {
        let counter = match severity {
            LogSeverity::Error => &mut self.stats.errors,
            LogSeverity::Warn => &mut self.stats.warnings,
            LogSeverity::Info => &mut self.stats.info,
            LogSeverity::Debug | LogSeverity::Trace => &mut self.stats.verbose,
        };
        *counter += 1;

        let occurrences = self.seen.entry(message.to_owned()).or_default();
        *occurrences += 1;
        *occurrences
    }
}

/// Install the filter and start counting from zero
pub(crate) fn init_debug_config(config: DebugConfig) {
    if let Ok(mut state) = VALIDATION.lock() {
        *state = Some(ValidationState::new(config));
    }
    if let Ok(mut last) = LAST_STATS.lock() {
        *last = ValidationStats::default();
    }
}

/// Stop forwarding messages (called before the messenger is destroyed)
pub(crate) fn cleanup_debug_config() {
    let Ok(mut state) = VALIDATION.lock() else {
        return;
    };
    if let (Some(state), Ok(mut last)) = (state.take(), LAST_STATS.lock()) {
        *last = state.stats;
    }
}

/// Validation message counts since the messenger was installed
pub fn get_validation_stats() -> ValidationStats {
    if let Ok(state) = VALIDATION.lock() {
        if let Some(state) = state.as_ref() {
            return state.stats;
        }
    }
    LAST_STATS.lock().map(|last| *last).unwrap_or_default()
}

fn repeated_message_count() -> usize {
    VALIDATION
        .lock()
        .ok()
        .and_then(|state| {
            state
                .as_ref()
                .map(|state| state.seen.values().filter(|&&count| count > 1).count())
        })
        .unwrap_or(0)
}

/// Print the per-severity message counts to stdout
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();
    if stats.total() == 0 {
        println!("\n{}", "Validation: no messages".green().bold());
        return;
    }

    let rows = [
        ("errors", stats.errors, Color::Red),
        ("warnings", stats.warnings, Color::Yellow),
        ("info", stats.info, Color::Cyan),
        ("verbose", stats.verbose, Color::BrightBlack),
    ];

    println!("\n{}", "Validation messages".bright_blue().bold());
    for (label, count, color) in rows {
        if count > 0 {
            println!("  {} {}", format!("{}:", label).color(color).bold(), count);
        }
    }
    println!("  {} {}", "total:".bold(), stats.total());

    let repeated = repeated_message_count();
    if repeated > 0 {
        println!("  {} distinct message(s) repeated", repeated);
    }
    println!();
}

/// Messenger severity mask for a filter
pub(crate) fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Engine severity of a validation message (highest bit wins)
pub(crate) fn log_severity(message_severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Info
    } else {
        LogSeverity::Trace
    }
}

fn type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Filter, count and format one message
///
/// Returns the log entry to emit, or None when the message is filtered out or
/// no configuration is installed.
pub(crate) fn process_message(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message_id_name: &str,
    message: &str,
) -> Option<(LogSeverity, String)> {
    let mut guard = VALIDATION.lock().ok()?;
    let state = guard.as_mut()?;

    if !severity_flags(state.config.severity).intersects(message_severity) {
        return None;
    }

    let severity = log_severity(message_severity);
    let occurrences = if state.config.enable_stats {
        state.record(severity, message)
    } else {
        1
    };
    drop(guard);

    let repeat = if occurrences > 1 {
        format!(" [x{}]", occurrences)
    } else {
        String::new()
    };

    Some((
        severity,
        format!("[{}]{} {}: {}", type_label(message_type), repeat, message_id_name, message),
    ))
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers; never aborts the Vulkan call.
#[cfg(feature = "vulkan-validation")]
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let message_id_name = callback_data
        .message_id_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".to_string());
    let message = callback_data
        .message_as_c_str()
        .map(|text| text.to_string_lossy().into_owned())
        .unwrap_or_else(|| "No message".to_string());

    if let Some((severity, text)) =
        process_message(message_severity, message_type, &message_id_name, &message)
    {
        engine_core::ecore::Engine::log(severity, VALIDATION_SOURCE, text);
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
