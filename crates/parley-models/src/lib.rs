pub mod chat;
pub mod gateway;
pub mod id;
pub mod message;
pub mod session;
pub mod user;
