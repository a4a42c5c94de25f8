//! Prompts for LLM field extraction.
//!
//! The response format here is a wire contract with
//! [`crate::pipeline::extract::parse_fields`]: one `Field Name: value` line
//! per field, with the exact field names listed in [`FIELD_NAMES`]. Change
//! one and the other must follow; the tests in `extract` pin both.

use crate::pipeline::extract::FIELD_NAMES;

/// System prompt for card field extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an assistant that analyzes text read off \
health insurance cards and presents it in an exact, fixed format. You never add commentary.";

/// Build the user message asking for the five fields.
///
/// Each field line carries the token the model should emit when the card
/// does not show that field; the parser treats those tokens as absent.
pub fn extraction_request(ocr_text: &str) -> String {
    let [first, last, member, group, company] = FIELD_NAMES;
    format!(
        "Here is the text data from a patient's insurance card:\n\n\
\"\"\"\n{ocr_text}\n\"\"\"\n\n\
Extract exactly these five fields and output them as five lines, in this order, \
using exactly this format and nothing else:\n\n\
{first}: <value, or \"Not Found\">\n\
{last}: <value, or \"Not Found\">\n\
{member}: <value, or \"Not Found\">\n\
{group}: <value, or \"Not Found\">\n\
{company}: <value, or \"Not Found\">\n\n\
Rules:\n\
- The patient is the member/subscriber named on the card.\n\
- Copy IDs exactly as printed, including letters and leading zeros.\n\
- Use \"Not Found\" when a field is not on the card. Do not guess."
    )
}
