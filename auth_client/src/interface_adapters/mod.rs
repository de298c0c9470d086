// Interface adapters: host, stores, loopback routes and remote API client.

pub mod clients;
pub mod handlers;
pub mod host;
pub mod protocol;
pub mod routes;
pub mod state;
