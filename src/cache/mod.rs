pub mod token;
pub mod token_store;
pub mod validity;
