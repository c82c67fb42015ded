pub mod archive;
pub mod config;
pub mod error;
pub mod i18n;
pub mod llm;
pub mod markup;
pub mod names;
pub mod orchestrator;
pub mod retry;
pub mod rewriter;
pub mod security;
pub mod server;
pub mod workspace;
