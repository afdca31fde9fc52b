// Embeddings module
// This module handles the remote embedding API, its HTTP transport and token estimates

pub mod client;
pub mod tokens;
pub mod transport;

pub use client::EmbeddingClient;
pub use tokens::{CostEstimate, estimate_cost, estimate_tokens};
pub use transport::{HttpResponse, HttpTransport, UreqTransport};
