//! The document value model: `Value`, `Document`, and the scalar types that
//! back them (`Decimal128`, `ObjectId`, `DateTime`).

mod datetime;
mod decimal;
mod document;
mod object_id;
mod value;

pub use datetime::DateTime;
pub use decimal::Decimal128;
pub use document::Document;
pub use object_id::ObjectId;
pub use value::Value;
