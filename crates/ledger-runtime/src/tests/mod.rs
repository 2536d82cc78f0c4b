pub mod helpers;

mod base_ledger_test;
