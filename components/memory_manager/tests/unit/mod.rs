//! Unit tests for memory_manager, exercised through the public API

mod test_collection;
mod test_shapes;
