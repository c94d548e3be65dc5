mod config_tests;
mod session_tests;
mod state_tests;
