mod parsing;
mod session;
mod settings;
mod types;

pub(crate) use session::load_session_meta;
pub(crate) use types::{ConfigError, Environment, ExamSettings, Settings};
