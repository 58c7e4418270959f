pub mod schema;
pub mod storage;
