//! System instructions and context formatting for answer generation.

use crate::knowledge::RetrievedChunk;
use chrono::{DateTime, Local};

/// Built-in instructions: answer from the PDF library only
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are a helpful assistant that answers questions about the user's PDF documents.
Answer only from the document excerpts provided with each question.
If the excerpts do not contain the answer, say that the documents do not cover it \
and do not answer from general knowledge.
Politely decline questions that are unrelated to the documents.
When you use an excerpt, mention the document it came from.
Format answers in Markdown.";

const NO_CONTEXT_NOTE: &str =
    "No relevant excerpts were found in the PDF documents for this question.";

/// System prompt with the current date and time appended
pub fn system_prompt(instructions: &str, now: DateTime<Local>) -> String {
    format!(
        "{}\n\nThe current date and time is {}.",
        instructions.trim_end(),
        now.format("%Y-%m-%d %H:%M:%S %Z")
    )
}

/// User message carrying the question and its numbered excerpts
pub fn user_message(question: &str, chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return format!("{}\n\nQuestion: {}", NO_CONTEXT_NOTE, question);
    }

    let mut context = String::from("Document excerpts:\n");
    for chunk in chunks {
        context.push_str(&format!(
            "\n[{}] {} (score {:.2})\n{}\n",
            chunk.rank,
            chunk.file_name,
            chunk.score,
            chunk.chunk_text.trim()
        ));
    }

    format!("{}\nQuestion: {}", context, question)
}
