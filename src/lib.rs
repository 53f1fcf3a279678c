//! Film4You assistant: streamed chat sessions with a language model, a
//! persistent chat widget and a one-shot AI search bar built on them, and the
//! HTTP endpoint that fronts the model backend.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod modes;
pub mod services;
