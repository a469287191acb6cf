//! Container topology module
//!
//! This module models the container orchestration file of the test stack
//! and checks its wiring.

pub mod compose;
pub mod stack;

pub use compose::{BuildSpec, ComposeFile, Environment, NameList, NetworkSpec, ServiceSpec, MTU_OPTION};
pub use stack::{test_stack, test_stack_with, StackOptions, API_SERVICE, DB_SERVICE};
