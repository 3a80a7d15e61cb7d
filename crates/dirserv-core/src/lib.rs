//! dirserv Core Library
//!
//! Shared leaf types for the dirserv request-processing engine.
//!
//! # Modules
//!
//! - [`dn`] - Distinguished names and the lazily decoded [`RawDn`]
//! - [`entry`] - Entries, attributes and attribute descriptions
//! - [`filter`] - Search filters (assertion-control subset)
//! - [`control`] - Request/response controls and well-known OIDs
//! - [`result`] - Protocol result codes
//! - [`schema`] - Minimal attribute schema with equality rules
//! - [`error`] - Standardized error types

pub mod control;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod result;
pub mod schema;

pub use control::Control;
pub use dn::{Dn, RawDn};
pub use entry::{Attribute, AttributeDescription, Entry};
pub use error::{CoreError, Result};
pub use filter::Filter;
pub use result::ResultCode;
pub use schema::{MatchingRule, Schema};
