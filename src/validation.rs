/**
 * Field-shape validation for poll creation and editing.
 *
 * Create and update run through the exact same checks; update can never
 * smuggle in a poll that creation would have refused.
 */
use crate::errors::PollError;

/**
 * Question and options after trimming, ready to store
 */
#[derive(Clone, Debug, PartialEq)]
pub struct PollFields {
    pub question: String,
    pub options: Vec<String>,
}

/**
 * Validate user-provided poll fields and return their normalized form.
 *
 * Wholly empty option entries (unfilled form slots) are dropped before the
 * count is checked. Entries that are only whitespace survive the drop and
 * fail the per-option length check.
 */
pub fn validate_poll_fields(question: &str, options: &[String]) -> Result<PollFields, PollError> {
    let question = question.trim();

    let length = question.chars().count();
    if length < 5 || length > 500 {
        return Err(PollError::QuestionLength);
    }

    let options: Vec<&String> = options.iter().filter(|option| !option.is_empty()).collect();

    if options.len() < 2 || options.len() > 10 {
        return Err(PollError::OptionCount);
    }

    let mut trimmed = Vec::with_capacity(options.len());

    for option in options {
        let option = option.trim();
        let length = option.chars().count();
        if length < 1 || length > 200 {
            return Err(PollError::OptionLength);
        }
        trimmed.push(option.to_string());
    }

    Ok(PollFields {
        question: question.to_string(),
        options: trimmed,
    })
}
