pub(crate) mod countdown;
pub(crate) mod exam_api;
pub(crate) mod exam_controller;
pub(crate) mod integrity;
pub(crate) mod notifications;
pub(crate) mod reconciliation;
pub(crate) mod session_state;
pub(crate) mod timers;
