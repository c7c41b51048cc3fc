//! Prompt construction and fenced-block extraction.

use once_cell::sync::Lazy;
use regex::Regex;

/// First fenced block with an optional info string (`json`, `jsonc`,
/// `javascript`, ...). Non-greedy so trailing fences in the commentary are
/// not swallowed.
static FENCED_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*(?:[A-Za-z0-9_+-]+)?[ \t]*\r?\n?(.*?)```").unwrap());

const FORMAT_RULES: &str = "Formatting rules:\n\
- Answer with exactly one fenced code block that starts with ```json and ends with ```.\n\
- Inside the block put only valid JSON: every key and every string value in double quotes.\n\
- Numbers are plain JSON numbers without currency symbols or thousands separators.\n\
- Dates use the YYYY-MM-DD format.\n\
- Do not add comments or any text outside the fenced block.";

/// Build the prompt for attempt `attempt` (0-based).
///
/// Attempt 0 gets the plain prompt; later attempts state that the previous
/// answer was rejected and repeat the formatting rules.
pub fn build_prompt(
    instruction: &str,
    input: &str,
    shape: &str,
    attempt: u32,
    last_failure: Option<&str>,
) -> String {
    if attempt == 0 {
        return format!(
            "{instruction}\n\n\
             Input data:\n{input}\n\n\
             Return the result as JSON with exactly this structure:\n```json\n{shape}\n```\n\n\
             Wrap your answer in a ```json fenced block."
        );
    }

    let reason = last_failure.unwrap_or("the response could not be used");
    format!(
        "Your previous response was malformed and was rejected ({reason}).\n\
         Follow the formatting rules strictly this time.\n\n\
         {instruction}\n\n\
         Input data:\n{input}\n\n\
         Required JSON structure:\n```json\n{shape}\n```\n\n\
         {FORMAT_RULES}"
    )
}

/// Extract the contents of the first fenced block in `text`.
///
/// Returns `None` when there is no complete fence pair or the block is blank.
pub fn extract_fenced_block(text: &str) -> Option<&str> {
    let caps = FENCED_BLOCK_RE.captures(text)?;
    let body = caps.get(1)?.as_str().trim();
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
