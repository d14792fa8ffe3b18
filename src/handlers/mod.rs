pub mod admin;
pub mod chat;
pub mod events;
pub mod notifications;
pub mod wallet;
