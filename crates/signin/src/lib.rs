pub mod capability;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use capability::CapabilityCache;
pub use config::SignInConfig;
pub use error::{FlowError, ServiceError, SignInError};
pub use events::{Emitter, SubscriptionId};
pub use service::{AuthorizationService, BrowserAuthenticator};
pub use store::{Collaborators, SignInStore};
pub use types::*;
