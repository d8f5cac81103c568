pub mod chat;
pub mod events;
pub mod models;
pub mod news;
pub mod session;
