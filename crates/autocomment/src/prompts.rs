//! Prompt text for the primary commenting pass and for per-file summaries.
//!
//! Bump `PROMPT_VERSION` whenever instruction content changes so logs can
//! tie a given output back to the prompt that produced it. The repair-tier
//! prompt lives next to the repair orchestrator in `guardrails`.

use guardrails::{GenerationRequest, SourceLanguage};

/// Prompt version. Bump on any instruction change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// Most comment blocks the model is asked for. The pruner enforces its own,
/// looser, budget afterwards.
pub const REQUESTED_MAX_BLOCKS: usize = 20;

pub const COMMENT_SYSTEM_INSTRUCTION: &str = "\
You are a senior engineer. Add comments only when they provide clear value.

Hard rules:
1. DO NOT delete or remove any part of the original source code.
2. If the file already has acceptable comments, or nothing valuable can be added, return it unchanged.
3. Only comment exported symbols and genuinely non-obvious logic.
4. No comments for trivial lines or obvious operations.
5. Prefer a single top-level summary comment if nothing else helps.
6. Each comment block is one line.
7. NEVER add imports, logic, new identifiers, or reorder anything.
8. NO markdown, code fences, or prose outside of source comments.
9. When in doubt, return the file exactly as given.";

/// Build the user prompt for one file.
///
/// `context` is an opaque reference bundle (e.g. summaries of related files);
/// the model is told not to act on it.
pub fn comment_prompt(content: &str, language: SourceLanguage, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Goal: add minimal, high-value comments ONLY where they are truly useful.\n\n\
         Language: {language}\n\n\
         Rules:\n\
         - Only add comments; do not modify code\n\
         - Do not delete any lines\n\
         - Do not restate names or obvious behaviour\n\
         - At most {REQUESTED_MAX_BLOCKS} concise comment blocks\n\
         - If nothing valuable applies, return the original source unchanged\n\
         - Output the entire file as plain text\n"
    );

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(
            "\n<<<CONTEXT>>> (reference only; never change code because of it)\n",
        );
        prompt.push_str(context.trim_end());
        prompt.push('\n');
    }

    prompt.push_str("\n<<<CONTENT>>>\n");
    prompt.push_str(content);
    prompt
}

pub fn comment_request(
    content: &str,
    language: SourceLanguage,
    context: Option<&str>,
) -> GenerationRequest {
    GenerationRequest::primary(
        COMMENT_SYSTEM_INSTRUCTION,
        comment_prompt(content, language, context),
    )
}

pub const CONTEXT_SYSTEM_INSTRUCTION: &str = "\
You summarise source files for other tools. Reply with a single JSON object \
and nothing else: no prose, no markdown, no code fences.";

/// Build the prompt asking for one file's [`FileSummary`](crate::context_store::FileSummary).
pub fn context_prompt(path: &str, content: &str, language: SourceLanguage) -> String {
    format!(
        "Analyze the {language} file and output a single JSON object with exactly these fields:\n\n\
         - path: string\n\
         - file_name: string\n\
         - summary: at most 50 words on the file's purpose and runtime behaviour. Mention \
         flags and defaults, file reads and writes, external calls, control-flow decisions, \
         and observable side effects or error returns. Skip local variables.\n\
         - exports: array of exported or public identifiers (names only)\n\
         - imports: array of imported modules or packages, as written in the source\n\n\
         Return valid JSON only.\n\n\
         Path:\n{path}\n\n\
         <<<CONTENT>>>\n{content}"
    )
}

pub fn context_request(path: &str, content: &str, language: SourceLanguage) -> GenerationRequest {
    GenerationRequest::primary(
        CONTEXT_SYSTEM_INSTRUCTION,
        context_prompt(path, content, language),
    )
}
