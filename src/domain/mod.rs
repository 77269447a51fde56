// Domain layer - Plain data shared by every other layer
pub mod chart;
pub mod connection;
pub mod device;
pub mod error;
pub mod experiment;
pub mod sample;
