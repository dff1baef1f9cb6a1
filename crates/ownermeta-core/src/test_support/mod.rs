//! Test support for code built on the metadata traits

pub mod mocks;
