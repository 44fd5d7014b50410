// src/query/mod.rs

pub mod adapter;
pub mod descriptor;
pub mod filter;
pub mod memory;
pub mod postgres;
pub mod result;

pub use adapter::{Backend, BackendError, QueryAdapter, Row, Rows};
pub use descriptor::{Link, OrderBy, QueryDescriptor, Relation, Window};
pub use filter::{Filter, FilterOp, FilterValue, Scalar, contains_pattern, escape_like};
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use result::{QueryError, QueryResult};
