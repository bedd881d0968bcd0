//! Built-in prompt templates, overridable per provider family via
//! `prompts.{ollama,anthropic,openai}` in the configuration.

use crate::config::PromptSet;

pub const DEFAULT_WIKI_SYSTEM: &str = "\
You are a senior engineer writing concise, accurate documentation for a code \
repository. Base every statement on the provided code excerpts. Use markdown \
with ## headings. Refer to code entities in backticks, e.g. `ClassName` or \
`function_name`. Never invent APIs that do not appear in the excerpts.";

pub const DEFAULT_RESEARCH_DECOMPOSITION: &str = "\
Decompose the question about a codebase into focused sub-questions.

Rules:
1. Return ONLY a JSON array of objects, no prose or code fences.
2. Each object has \"text\" and \"category\" fields.
3. \"category\" is one of: structure, flow, dependencies, impact, comparison.
4. Produce at most {max_sub_questions} sub-questions.

Question: {question}";

pub const DEFAULT_RESEARCH_GAP_ANALYSIS: &str = "\
You are reviewing evidence gathered to answer a question about a codebase.

Question: {question}

Sub-questions investigated:
{sub_questions}

Evidence summaries:
{evidence}

List up to {max_follow_ups} follow-up search queries that would fill gaps in \
the evidence. Return ONLY a JSON array of strings. Return [] if the evidence \
is sufficient.";

pub const DEFAULT_RESEARCH_SYNTHESIS: &str = "\
Answer the question using only the code evidence below. Cite evidence inline \
as (file:start-end), e.g. (src/indexer.rs:40-55). Structure the answer with \
markdown. State clearly when the evidence is insufficient for part of the \
answer.

Question: {question}

Evidence:
{evidence}";

/// Resolve a template: a non-empty config override wins over the built-in.
pub fn resolve<'a>(configured: &'a str, default: &'a str) -> &'a str {
    if configured.trim().is_empty() {
        default
    } else {
        configured
    }
}

pub fn wiki_system(set: &PromptSet) -> &str {
    resolve(&set.wiki_system, DEFAULT_WIKI_SYSTEM)
}

pub fn research_decomposition(set: &PromptSet) -> &str {
    resolve(&set.research_decomposition, DEFAULT_RESEARCH_DECOMPOSITION)
}

pub fn research_gap_analysis(set: &PromptSet) -> &str {
    resolve(&set.research_gap_analysis, DEFAULT_RESEARCH_GAP_ANALYSIS)
}

pub fn research_synthesis(set: &PromptSet) -> &str {
    resolve(&set.research_synthesis, DEFAULT_RESEARCH_SYNTHESIS)
}
