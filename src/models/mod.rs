pub mod chat;
pub mod meal;
pub mod user;
