pub mod app;
pub mod backend;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod gfx;
pub mod loader;
pub mod poller;
pub mod state;
pub mod ui;
pub mod upload;
pub mod viewer;
pub mod viewport;
