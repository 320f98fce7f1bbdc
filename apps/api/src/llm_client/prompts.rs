// Shared prompt constants and prompt-building utilities.
// Each module that needs generation defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every rewrite prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every fact you write must be traceable to the candidate's answer or profile \
    provided in the context. Do NOT infer, interpolate, or invent details. \
    Never introduce a name, organization, number, date, tool, or document type that the \
    candidate did not state. If the context does not support a detail, omit it entirely.";
