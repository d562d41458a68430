//! Tidechat - conversational AI backend
//!
//! Users open conversations, send messages, and receive incrementally
//! generated AI replies. The core is the streaming pipeline: a cancellable
//! session bridges the upstream token stream to the client transport while
//! guaranteeing the accumulated reply is persisted exactly once on every
//! exit path.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
