pub mod auth;
pub mod chats;
pub mod health;
pub mod meals;
pub mod profile;
pub mod ws;
