pub mod attachment;
pub mod audio;
pub mod config;
pub mod gemini_adapter;
pub mod prompt_loader;
pub mod repl;
pub mod sink;
