pub mod loader;
pub mod source;
pub mod store;
pub mod walker;
