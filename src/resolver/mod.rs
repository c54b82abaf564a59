pub mod token_resolver;
