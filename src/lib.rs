pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod metric;
pub mod model;
pub mod node;
pub mod parsers;
pub mod provider;
pub mod session;
pub mod tree;
pub mod uri;
