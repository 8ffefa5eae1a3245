//! Authentication and authorization for the porter access controller.
//!
//! This crate owns the user database: a flat CSV file loaded once at
//! startup into an in-memory index, appended to when the control
//! terminal enrolls someone new. Policy evaluation is time- and
//! role-aware; see [`Authenticator::auth_user`].
//!
//! # Concurrency
//!
//! One [`Authenticator`] is shared by every terminal connection. A single
//! mutex guards both the code index and the file append so that a reader
//! can never observe an enrollment half-applied.

pub mod authenticator;
pub mod error;
pub mod store;
pub mod user;

pub use authenticator::{Access, Authenticator};
pub use error::{EnrollError, StoreError, StoreResult};
pub use store::UserFile;
pub use user::User;
