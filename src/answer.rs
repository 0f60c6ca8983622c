//! Grounded answer generation and reference cleanup.
//!
//! Builds a single prompt from the retrieved chunks, invokes the language
//! model once, and scrubs the raw output of document-reference artifacts.
//! The model is instructed not to cite pages or documents, but instructions
//! are not constraints, so [`clean_answer`] runs as a second line of defense.
//! The cleanup is a pure, ordered rewrite chain and is idempotent: running
//! it on already-clean text changes nothing.

use regex::Regex;
use std::sync::OnceLock;

use crate::llm::{LanguageModel, LlmError};
use crate::retrieve::ScoredChunk;

/// Fallback reply when nothing relevant is stored or the model call fails.
pub const NO_CONTEXT_REPLY: &str = "I'm still learning about that topic! I don't have \
    enough information to answer that yet. Try asking about something else, or reach \
    out to the student support office for more help.";

/// Visible separator between context entries in the prompt.
const CONTEXT_SEPARATOR: &str = "\n-----\n";

/// Generate a cleaned answer for `question` grounded in `chunks`.
///
/// An empty chunk list short-circuits to [`NO_CONTEXT_REPLY`]; a model
/// failure propagates so the orchestrator can record zero latency before
/// degrading to the same canned reply.
pub async fn generate(
    model: &dyn LanguageModel,
    question: &str,
    chunks: &[ScoredChunk],
) -> Result<String, LlmError> {
    if chunks.is_empty() {
        return Ok(NO_CONTEXT_REPLY.to_string());
    }

    let prompt = build_prompt(question, chunks);
    let raw = model.generate(&prompt).await?;
    Ok(clean_answer(&raw))
}

/// Assemble the full prompt: persona, formatting rules, context block,
/// question.
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("[{}, page {}]\n{}", c.filename, c.page, c.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "You are a friendly student support assistant. Use the provided context from \
         official student documents to answer the question naturally and conversationally.\n\
         \n\
         Guidelines:\n\
         - Answer only from the provided context\n\
         - Write in a natural, conversational tone like a helpful student assistant\n\
         - Never mention page numbers, document names, or technical references\n\
         - Use the bullet character \u{2022} when listing items, never raw asterisks\n\
         - If the context does not cover the question, say you are still learning about that topic\n\
         - Keep answers clear, friendly, and helpful for students\n\
         \n\
         Context:\n{context}\n\
         \n\
         Question: {question}\n\
         \n\
         Please provide a helpful, natural answer without technical references:"
    )
}

fn page_refs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bpages?\s+\d+(?:\s*[-–]\s*\d+)?(?:(?:\s*,\s*|\s+and\s+)\d+)*")
            .expect("page reference pattern compiles")
    })
}

fn doc_refs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:document|section)\s+\d+(?:\.\d+)*\b")
            .expect("document reference pattern compiles")
    })
}

fn star_bullets() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*\*[ \t]+").expect("bullet pattern compiles"))
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("space pattern compiles"))
}

fn newline_padding() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]*\n[ \t]*").expect("newline pattern compiles"))
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank line pattern compiles"))
}

/// Scrub document-reference artifacts from model output.
///
/// Rewrites apply in a fixed order: page references, document/section
/// references, `* ` bullet markers to `\u{2022} `, whitespace normalization
/// (runs of spaces and tabs collapse to one space, runs of blank lines to
/// one; newlines themselves are preserved so bullet lists survive), trim.
pub fn clean_answer(raw: &str) -> String {
    let text = page_refs().replace_all(raw, "");
    let text = doc_refs().replace_all(&text, "");
    let text = star_bullets().replace_all(&text, "\u{2022} ");
    let text = space_runs().replace_all(&text, " ");
    let text = newline_padding().replace_all(&text, "\n");
    let text = blank_runs().replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DisabledModel;

    fn chunk(text: &str, page: i64, filename: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: 1,
            document_id: 1,
            text: text.to_string(),
            page,
            filename: filename.to_string(),
            score: 1,
        }
    }

    #[test]
    fn strips_page_references() {
        assert_eq!(
            clean_answer("Enrollment opens March 1 (see page 3)."),
            "Enrollment opens March 1 (see )."
        );
        assert_eq!(
            clean_answer("Fees are listed on pages 2, 3 and 5 of the handbook."),
            "Fees are listed on of the handbook."
        );
        assert_eq!(clean_answer("Covered in page 4-6 today."), "Covered in today.");
    }

    #[test]
    fn strips_document_and_section_references() {
        assert_eq!(
            clean_answer("Per document 2 and section 4.1, fees apply."),
            "Per and , fees apply."
        );
    }

    #[test]
    fn converts_star_bullets() {
        let raw = "Requirements:\n* Form 137\n* Valid ID\n  * Receipt";
        let cleaned = clean_answer(raw);
        assert_eq!(
            cleaned,
            "Requirements:\n\u{2022} Form 137\n\u{2022} Valid ID\n\u{2022} Receipt"
        );
    }

    #[test]
    fn collapses_whitespace_but_keeps_lines() {
        let raw = "Deadlines  matter.\t Really.\n\n\n\nNext   line.";
        assert_eq!(clean_answer(raw), "Deadlines matter. Really.\n\nNext line.");
    }

    #[test]
    fn cleanup_is_idempotent() {
        let samples = [
            "Enrollment opens March 1 (see page 3).",
            "* one\n* two\n\n\nPer section 2.3, pages 4 and 5.",
            "already clean text\nwith \u{2022} bullets",
            "",
            "   padded   ",
        ];
        for raw in samples {
            let once = clean_answer(raw);
            assert_eq!(clean_answer(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn prompt_carries_context_and_question() {
        let chunks = vec![chunk("Enrollment opens March 1.", 1, "handbook.pdf")];
        let prompt = build_prompt("When does enrollment open?", &chunks);
        assert!(prompt.contains("[handbook.pdf, page 1]"));
        assert!(prompt.contains("Enrollment opens March 1."));
        assert!(prompt.contains("Question: When does enrollment open?"));
        assert!(prompt.contains("never raw asterisks"));
    }

    #[tokio::test]
    async fn empty_chunk_list_short_circuits() {
        let model = DisabledModel;
        let out = generate(&model, "anything", &[]).await.unwrap();
        assert_eq!(out, NO_CONTEXT_REPLY);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = DisabledModel;
        let chunks = vec![chunk("some context", 1, "handbook.pdf")];
        assert!(generate(&model, "anything", &chunks).await.is_err());
    }
}
