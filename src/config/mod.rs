pub mod connection;
pub mod provider;
pub mod settings;
