// Library crate exposing modules for the binary, integration tests and benches

pub mod adapter;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod repository;
pub mod util;
