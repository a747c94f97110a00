//! SQL repositories.
//!
//! Each submodule owns the queries for one table. Repositories are plain
//! functions over a [`sqlx::PgPool`]; access control and validation live in
//! the services, not here.

pub mod audit;
pub mod exams;
pub mod patients;
pub mod schema;
pub mod tokens;
