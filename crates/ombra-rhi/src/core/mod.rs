pub mod allocator;
pub mod buffer;
pub mod command;
pub mod command_queue;
pub mod debug_utils;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod synchronize;
