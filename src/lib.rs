pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod resource;
pub mod types;
pub mod upstream;
pub mod watchlist;
