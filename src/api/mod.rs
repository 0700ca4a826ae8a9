pub(crate) mod answer_keys;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod submissions;
pub(crate) mod validation;
