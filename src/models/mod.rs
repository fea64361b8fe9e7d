pub mod chat;
pub mod portfolio;
pub mod websocket;
