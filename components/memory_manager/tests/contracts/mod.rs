//! Contract tests for the public memory_manager API

mod test_api_contract;
