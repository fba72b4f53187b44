//! Schema normalization: raw rows of heterogeneous layouts → canonical event records.

pub mod coerce;
pub mod record;
pub mod schema;
pub mod user_agent;
