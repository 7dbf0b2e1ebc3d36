//! Strict JSON-Schema subset validation.
//!
//! Two consumers, two modules:
//!
//! - [`validate`]: runtime validation of concrete payloads against a
//!   declared schema (inputs before dispatch, outputs after). Fails fast
//!   with a stable code, a path-bearing message, and constraint metadata.
//! - [`compat`]: static structural compatibility between two schemas, used
//!   by the pipeline validator to prove step wiring at registry load time.
//!   Collects every incompatibility instead of failing fast.
//!
//! Supported keywords: `type`, `enum`, `required`, `properties`,
//! `additionalProperties`, `minLength`/`maxLength`, `minimum`/`maximum`,
//! `minItems`/`maxItems`, `items`, and `format` (`uri`, `date-time`).

pub mod compat;
pub mod validate;

pub use compat::check_compatibility;
pub use validate::{validate_value, SchemaViolation};
