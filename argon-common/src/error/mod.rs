#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Resource Not Found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Illegal State: {0}")]
    IllegalState(String),

    #[error("Channel Communication Error: {0}")]
    ChannelComm(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Internal Error: {0}")]
    Internal(String),

    #[error("Conflict Error: {0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(resource_type: &str, resource_id: impl ToString) -> Self {
        Error::NotFound {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
        }
    }
}
