pub mod ai_cmd;
pub mod analysis_cmd;
pub mod record_cmd;
pub mod settings_cmd;
