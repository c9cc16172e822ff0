//! External services used by the handlers.

pub mod email;

pub use email::{EmailError, Mailer};
