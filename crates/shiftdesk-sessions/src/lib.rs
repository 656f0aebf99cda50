//! Store-backed sessions for shiftdesk
//!
//! A session is created at login, bound to a CSRF token, and validated on
//! every request. Records live in the shared key-value store so any process
//! can validate any session.
//!
//! ## Modules
//!
//! - [`manager`]: [`SessionManager`] (create, validate, refresh, invalidate)
//! - [`record`]: [`SessionRecord`] and the [`UserData`] snapshot
//! - [`csrf`]: session id and CSRF token generation
//! - [`password`]: [`PasswordHasher`], [`Argon2Hasher`], [`PasswordSecurity`]

pub mod csrf;
pub mod error;
pub mod manager;
pub mod password;
pub mod record;

pub use error::SessionError;
pub use manager::SessionManager;
pub use password::{
	Argon2Hasher, MIN_PASSWORD_LENGTH, PasswordHasher, PasswordSecurity, StrengthViolation,
};
pub use record::{SessionRecord, UserData};
