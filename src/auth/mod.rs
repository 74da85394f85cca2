//! Credential lifecycle for outgoing requests.

pub mod token;

pub use token::{
    IssuedToken, SecretToken, SecureTokenHandler, TokenError, TokenLifecycle, TokenProvider,
    TokenSource,
};
