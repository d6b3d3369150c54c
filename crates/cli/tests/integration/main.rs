mod common;
mod lock_tests;
mod state_tests;
