//! Unit tests for bytecode_system, exercised through the public API

mod test_caches;
