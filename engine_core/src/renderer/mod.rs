/// Renderer module - pipeline, descriptor and backend interface types

// Module declarations
pub mod handle;
pub mod format;
pub mod shader;
pub mod resource;
pub mod descriptor;
pub mod descriptor_layout;
pub mod descriptor_pool;
pub(crate) mod binding_table;
pub mod pipeline_state;
pub mod pipeline_config;
pub mod device;
pub mod command_list;
pub mod pipeline;
pub mod dynamic_rendering;
pub mod config;

#[cfg(test)]
pub mod mock_device;

// Re-export everything
pub use handle::*;
pub use format::*;
pub use shader::*;
pub use resource::*;
pub use descriptor::*;
pub use descriptor_layout::*;
pub use descriptor_pool::DescriptorPoolSizing;
pub use pipeline_state::*;
pub use pipeline_config::*;
pub use device::*;
pub use command_list::*;
pub use pipeline::*;
pub use dynamic_rendering::*;
pub use config::*;
