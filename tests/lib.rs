//! Integration tests for the bytecode generator. See the individual test
//! targets; this crate intentionally has no library code.
