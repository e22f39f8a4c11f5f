//! Shared helpers for bouquet's unit and integration tests.

pub mod db;
pub mod logging;
pub mod problem_details;

pub use db::test_database_url;
pub use problem_details::{assert_problem_details, assert_problem_response};
