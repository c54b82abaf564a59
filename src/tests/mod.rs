pub mod common;
pub mod implicit_flow;
pub mod service_account;
