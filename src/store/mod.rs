pub mod entity;
pub mod location;
pub mod schema_gen;
pub mod sqlite;
pub mod upsert;

pub use entity::*;
pub use location::*;
pub use sqlite::{find_lookup, find_or_create, find_planet, linked, Store};
pub use upsert::*;
