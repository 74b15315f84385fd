//! Token domain types: normalized scopes, redacted secrets, and the immutable token value.

pub mod scope;
pub mod secret;
pub mod token;

pub use scope::*;
pub use secret::*;
pub use token::*;
