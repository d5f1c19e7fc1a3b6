//! Credential loading, JWT-bearer assertions, and bearer token models.

pub mod assertion;
pub mod credential;
pub mod token;

pub use assertion::*;
pub use credential::*;
pub use token::{record::*, secret::*};
