pub mod health;
pub mod rpc;
pub mod tools;
