//! Live migration and whole-database relocation, source to destination.

mod common;

mod faults;
mod keys;
mod walk;
mod whole_db;
