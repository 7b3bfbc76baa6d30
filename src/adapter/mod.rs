pub mod cache;
pub mod datastore;
pub mod eventstream;
