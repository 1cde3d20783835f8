pub mod analyze;
pub mod commands;
pub mod render;
pub mod responses;
pub mod upload;
