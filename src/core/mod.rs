// src/core/mod.rs

pub mod config;
pub mod quote;
pub mod retry;
pub mod template;
