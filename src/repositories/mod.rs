pub(crate) mod answer_keys;
pub(crate) mod health;
pub(crate) mod question_results;
pub(crate) mod store;
pub(crate) mod submissions;
