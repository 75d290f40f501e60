//! Application lifecycle: settings, transport wiring and the HTTP server

pub mod app;

pub use app::Application;
