mod access;
mod models;

pub use access::{Privacy, Role};
pub use models::*;
