pub mod server;
pub mod types;

pub use server::{create_router, start_server, AppState, MAX_MESSAGE_LENGTH};
