pub mod config;
pub mod launcher;
pub mod pipeline;
pub mod pricing;
pub mod provider;
