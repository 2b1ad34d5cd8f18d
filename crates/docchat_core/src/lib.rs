pub mod domain;
pub mod ports;

pub use domain::{
    Answer, Conversation, ConversationSummary, Dataset, ManagedUser, Message, NewUser, Role,
    UploadFile, User,
};
pub use ports::{BackendService, KeyValueStore, PortError, PortResult};
