// Application layer - The monitoring pipeline and its ports
pub mod backend;
pub mod chart_renderer;
pub mod command_dispatcher;
pub mod connection_manager;
pub mod poller;
pub mod range_calculator;
pub mod session;
pub mod status_board;
pub mod time_series_store;
