pub mod auth;
pub mod handlers;
pub mod server;
pub mod websocket;

pub use auth::{generate_token, verify_token, AuthenticatedUser};
pub use server::{router, run, serve, shutdown_signal, ApiState};
