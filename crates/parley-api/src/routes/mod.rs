pub mod chats;
pub mod messages;
pub mod users;
