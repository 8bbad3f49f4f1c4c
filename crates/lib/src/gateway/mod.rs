//! Gateway HTTP server.

mod server;

pub use server::{
    router, run_gateway, AppState, ChatRequest, ChatResponse, EmbeddingsRequest,
};
