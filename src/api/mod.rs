pub mod error;
pub mod filters;
pub mod handler_utils;
pub mod server;
pub mod sessions;
