pub mod assets;
pub mod attachments;
pub mod frame;
pub mod graph;
pub mod init_log;
pub mod lights;
pub mod material;
pub mod renderer;
pub mod resolver;
