pub mod message;
pub mod query;
pub mod text;
pub mod whitelist;
