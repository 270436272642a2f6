pub mod debounce;
pub mod files;
pub mod schema;

pub use debounce::DebouncedWriter;
pub use files::{read_json, write_json_atomic};
pub use schema::StateFile;
