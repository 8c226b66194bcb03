pub mod app;
pub mod config;
pub mod sessions;
pub mod tmux;
