pub mod core;
pub mod rhi;
