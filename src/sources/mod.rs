//! Token acquisition strategies: ambient service-account credentials,
//! password grant against the Token Service, browser implicit flow.
pub mod implicit_flow;
pub mod password_grant;
pub mod response;
pub mod service_account;
