//! Risk matrix loading and validation.
//!
//! The matrix is structured data validated against JSON Schema and then
//! resolved into shared, immutable categories and countries.

mod parser;
mod schema;

pub use parser::{
    Country, MatrixError, QueryTemplate, RiskCategory, RiskMatrix, DEFAULT_QUERY_TEMPLATE,
};
pub use schema::validate_matrix_schema;
