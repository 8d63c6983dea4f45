mod common;
mod concurrency_tests;
mod scenario_tests;
