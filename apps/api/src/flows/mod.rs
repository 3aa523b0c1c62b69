pub mod catalog;
pub mod engine;
pub mod handlers;
pub mod media;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod template;
