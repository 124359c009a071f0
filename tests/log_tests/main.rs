//! Tests for the replicated log and its content codec

mod memory_log_tests;
