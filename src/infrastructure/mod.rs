// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod http_backend;
pub mod log_surface;
pub mod socketio;
pub mod socketio_transport;
pub mod terminal_surface;
