//! Contract tests for the public core_types API
