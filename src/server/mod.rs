mod commits;
pub mod dto;
mod playgrounds;
pub mod response;
mod router;

pub use router::{AppState, create_router};
