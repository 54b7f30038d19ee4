pub mod commands;
pub mod config;
pub mod demo;
pub mod monitor;
pub mod output;
