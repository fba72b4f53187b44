//! Row sources: raw tabular rows, the transport trait, and the gviz feed adapter.

pub mod gviz;
pub mod row;
pub mod source;
