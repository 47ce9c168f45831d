//! Real-time collaboration backend for a shared whiteboard canvas.
//!
//! Clients join a document's room over a WebSocket and exchange whole-scene
//! updates and comments. Every accepted scene is recorded as a numbered
//! version; every comment is stored alongside the document.

pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
pub mod ws;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
