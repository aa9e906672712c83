//! Domain models shared by the core components and the HTTP gateway.

pub mod audit;
pub mod auth;
pub mod permissions;
