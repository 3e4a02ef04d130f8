/*!
# Engine Core

Backend-agnostic pipeline and resource-binding layer of the engine.

This crate sits between render passes (FXAA, SSAO, SSR, depth peeling, ...)
and the graphics API. A pass declares its descriptor sets and pipeline state
once, then stages resource bindings, flushes them in a single batched update,
and binds the pipeline and its descriptor sets while recording.

## Architecture

- **Pipeline**: owns the pipeline object, its layout, its set layouts and its
  descriptor pool (graphics, compute or ray tracing)
- **DynamicRendering**: render-pass-less begin/end rendering with layout
  transitions
- **Device**: trait implemented by backends to create and destroy GPU objects
- **CommandList**: trait implemented by backends to record commands
- **Shader / Texture / Buffer / Sampler / AccelerationStructure**: resources
  referenced by handle, never owned

Backend implementations (Vulkan) provide concrete types that implement these
traits.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod renderer;

// Main ecore namespace module
pub mod ecore {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton (logging hub)
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Render sub-module with all pipeline and binding types
    pub mod render {
        pub use crate::renderer::*;
    }
}
