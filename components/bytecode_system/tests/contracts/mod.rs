//! Contract tests for bytecode_system

mod test_compiler_contract;
