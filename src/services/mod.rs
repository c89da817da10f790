pub mod ai_service;
pub mod ai_task;
pub mod attachments;
pub mod classifier;
pub mod persistence;
pub mod prompts;
pub mod record_store;
pub mod response_parser;
pub mod session;
pub mod trading_day;
