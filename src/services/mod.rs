pub mod conversation_service;
pub mod delivery_service;
pub mod directory;
pub mod message_service;
pub mod notify;
pub mod read_service;
pub mod reaction_service;
