//! Auth-domain models: client credentials, token secrets, and cached tokens.

pub mod credentials;
pub mod secret;
pub mod token;

pub use credentials::*;
pub use secret::*;
pub use token::*;
