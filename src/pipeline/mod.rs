pub mod catalog;
pub mod codegen;
pub mod descriptions;
pub mod executor;
pub mod image_data;
pub mod parameters;
pub mod processing;
pub mod session;
pub mod settings;
pub mod workflow;
