// API module for the catalog import HTTP server
// Import endpoint plus list/detail reads over the catalog schema

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
