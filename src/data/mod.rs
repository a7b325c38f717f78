pub mod output;
pub mod parse;
pub mod table;

pub use parse::{Cell, JsonArray, JsonObject, Parsable, ParserRegistry, TableParsers, TypedParser};
pub use table::Table;
