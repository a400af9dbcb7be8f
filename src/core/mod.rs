pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod gesture;
pub mod log_io;
pub mod model;
pub mod replay_engine;
pub mod state;
pub mod tracker;
pub mod zones;
