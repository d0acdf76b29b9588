//! End-to-end tests of the running pipeline

mod common;
mod directory_tests;
mod web_tests;
