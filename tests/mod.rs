mod common;
mod delivery_tests;
mod replay_tests;
mod retry_tests;
