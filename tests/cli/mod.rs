//! CLI transport integration tests.

mod process_test;
