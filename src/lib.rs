//! Stress-tests a business model description against an LLM and renders the
//! result as a fixed-layout risk report.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod telemetry;
