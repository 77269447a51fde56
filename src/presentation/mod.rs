// Presentation layer - Command line entry points
pub mod cli;
pub mod handlers;
