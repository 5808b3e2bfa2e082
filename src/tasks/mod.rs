pub(crate) mod console;
pub(crate) mod runtime;
