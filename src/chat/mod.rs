pub mod messages;
pub mod relay;
pub mod unseen;
