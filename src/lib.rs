pub mod catalogs;
pub mod constants;
pub mod index;
pub(crate) mod observability;
mod progress;
pub mod row;
pub mod schema;
pub mod ssfiletable_errors;
pub mod table;

pub use ssfiletable_errors::SsTableError;
