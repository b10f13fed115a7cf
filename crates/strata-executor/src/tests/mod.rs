//! Cross-operator scenario tests

mod common;

mod aggregate_tests;
mod difference_tests;
mod join_tests;
mod operator_contract_tests;
mod translator_tests;
mod union_tests;
