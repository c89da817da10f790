pub mod ai;
pub mod extraction;
pub mod record;
pub mod settings;
