pub mod api_server;
pub mod extractor;
pub mod pipeline;
pub mod registry;
pub mod verifier;
