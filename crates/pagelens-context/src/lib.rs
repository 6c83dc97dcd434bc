pub mod extract;
pub mod format;

pub use extract::extract;
pub use format::{
    FormattedPrompt, create_question_prompt, create_summary_prompt, data_url_to_base64,
    format_context,
};
