pub mod blob;
pub mod device;
pub mod guard;
pub mod lifecycle;
pub mod models;
pub mod store;

pub use models::{Hack, Patch, PatchId};
