pub mod cli;
pub mod config;
pub mod error;
pub mod imaging;
pub mod llm;
pub mod pose;
pub mod state;
pub mod utils;
