//! Property-based tests

mod merge_proptest;
