mod history_tests;
mod parser_tests;
mod range_tests;
mod retry_tests;
mod scan_tests;
mod state_tests;
