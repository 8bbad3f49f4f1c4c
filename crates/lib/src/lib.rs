//! Verso core library — channel activity types, inbound/outbound auth,
//! retrieval pipeline, and the HTTP gateway used by the CLI binary.

pub mod activity;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
