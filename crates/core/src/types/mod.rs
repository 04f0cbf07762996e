//! Shared identifiers, domain records, and error taxonomy.

pub mod error;
pub mod ids;
pub mod model;
