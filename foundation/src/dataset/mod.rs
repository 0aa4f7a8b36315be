mod column;
mod reader;
mod schema;
mod split;
mod table;

pub use column::{Column, DType};
pub use schema::{Field, Schema};
pub use split::{stratified_split, train_test_split};
pub use table::Table;
