// Re-export the API module components
pub use self::{
    client::{ApiClient, VerificationServer, DEFAULT_SERVER_URL},
    errors::ApiClientError,
    models::{
        ContractDescriptor, SessionData, VerifyCheckRequest, VerifyRequest, VerifyResponse,
        VerifyResult, STATUS_OK,
    },
};

// Module declarations
mod client;
mod errors;
mod models;
