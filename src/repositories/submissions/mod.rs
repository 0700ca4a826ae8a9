mod commands;
mod queries;
mod types;

pub(crate) use commands::{
    complete, delete_unless_processing, fail, fail_stale_processing, insert, mark_processing,
    save_extracted_text,
};
pub(crate) use queries::{find_by_id, list, next_pending_id};
pub(crate) use types::{CompletionUpdate, SubmissionFilter};
