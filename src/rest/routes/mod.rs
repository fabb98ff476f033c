pub mod chat;
pub mod chats;
pub mod feedback;
pub mod health;
pub mod quiz;
pub mod root;
