#![forbid(unsafe_code)]

pub mod anthropic;
pub mod backend;
pub mod cli;
pub mod compile;
pub mod formats;
pub mod gemini;
pub mod generate;
pub mod interactive;
pub mod logging;
pub mod openai;
pub mod outline;
pub mod params;
pub mod progress;
pub mod sse;
pub mod stages;
pub mod store;
pub mod template;
