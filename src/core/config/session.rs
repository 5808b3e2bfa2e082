use validator::Validate;

use super::parsing::{
    env_optional, env_required, parse_answer_map, parse_i64, parse_question_ids,
};
use super::types::ConfigError;
use crate::schemas::session::SessionMeta;

/// Reads the page metadata of the exam session this process drives.
pub(crate) fn load_session_meta() -> Result<SessionMeta, ConfigError> {
    let session_id = env_required("EXAM_SESSION_ID")?;
    let duration_minutes =
        parse_i64("EXAM_DURATION_MINUTES", env_required("EXAM_DURATION_MINUTES")?)?;
    let time_remaining = match env_optional("EXAM_TIME_REMAINING") {
        Some(value) => parse_i64("EXAM_TIME_REMAINING", value)?,
        None => duration_minutes.saturating_mul(60),
    };
    let question_ids =
        parse_question_ids("EXAM_QUESTION_IDS", env_required("EXAM_QUESTION_IDS")?)?;
    let existing_answers =
        parse_answer_map("EXAM_EXISTING_ANSWERS", env_optional("EXAM_EXISTING_ANSWERS"))?;

    let meta =
        SessionMeta { session_id, duration_minutes, time_remaining, question_ids, existing_answers };
    meta.validate().map_err(|err| ConfigError::InvalidSession(err.to_string()))?;

    Ok(meta)
}
