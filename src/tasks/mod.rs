pub mod data;
pub mod endpoints;
pub mod engine;
pub mod store;
