pub mod filters;
pub mod identity;
pub mod scope;

pub use filters::{Pagination, SearchFilters, SearchRequest};
pub use identity::{FilterIdentity, SessionKey, identity};
pub use scope::QuotaScope;
