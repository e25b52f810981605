pub mod chat;
pub mod directory;
pub mod error;
pub mod ids;
