pub mod parse;
pub mod pipeline;
pub mod registry;
