//! Gateway plumbing: the outbound dispatcher client and the inbound
//! JSON-RPC method table

mod client;
pub mod methods;
pub mod protocol;

pub use client::{DispatchError, Dispatcher, GatewayClient};
