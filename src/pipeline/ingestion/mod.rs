pub mod import_log;

pub use import_log::{ImportEntry, ImportLog};
