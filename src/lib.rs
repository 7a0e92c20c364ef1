pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handler;
pub mod naming;
pub mod resource;
pub mod server;
pub mod types;

pub use api::{RequestContext, Response};
pub use error::JsonApiError;
pub use handler::{Handler, HandlerSettings, JsonApi, Services};

#[cfg(test)]
pub mod testing;
