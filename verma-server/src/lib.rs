pub mod captioning;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod speech;
pub mod translation;
pub mod web;
