// Prompt constants for the Coach agent.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::agents::rubric::RubricComponent;
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};

/// Used when no STAR guide file is configured.
pub const DEFAULT_STAR_GUIDE: &str = "\
The STAR method structures a behavioral answer in four parts.
Situation: set the scene briefly. Where were you, what was going on, why did it matter?
Task: state what you personally were responsible for or needed to achieve.
Action: describe the specific steps you took, in the first person, in order.
Result: close with the outcome, quantified where the candidate gave numbers, and what changed.
Keep each part short. The Action should be the longest part.";

pub fn coach_system() -> String {
    format!(
        "You are an expert interview coach specializing in the STAR method \
        (Situation, Task, Action, Result). You critique narrative structure only, \
        never technical content. {JSON_ONLY_SYSTEM}"
    )
}

/// Coach prompt template.
/// Replace: {grounding_instruction}, {star_guide}, {question}, {answer},
///          {profile_snippets}, {missing_components}
pub const COACH_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

Use this guide as your style reference:
<STAR_GUIDE>
{star_guide}
</STAR_GUIDE>

INTERVIEW QUESTION:
"{question}"

CANDIDATE'S ANSWER:
"{answer}"

FACTS FROM THE CANDIDATE'S PROFILE (the only other facts you may use):
{profile_snippets}

STRUCTURE GAPS DETECTED: {missing_components}

You may think first inside <thinking></thinking> tags. Then return a JSON object with this EXACT schema:
{
  "coach_critique": "Two or three sentences on the answer's structure: which STAR parts are weak or missing and why.",
  "rewritten_answer": "**Situation:** ... **Task:** ... **Action:** ... **Result:** ..."
}

Rules for the rewrite:
- Restructure the candidate's own facts into the four STAR parts.
- If a part has no supporting fact, write a short neutral sentence without new facts rather than inventing one.
- Do not mention technical skills or competencies the candidate did not state."#;

/// Appended on the single regeneration after a containment violation.
/// Replace: {violations}
pub const STRICT_ADDENDUM_TEMPLATE: &str = r#"

YOUR PREVIOUS REWRITE WAS REJECTED. It introduced facts the candidate never stated: {violations}.
Rewrite again using ONLY words, names, numbers, and document types that appear in the candidate's answer or profile above.
When in doubt, leave the detail out."#;

pub fn build_coach_prompt(
    star_guide: &str,
    question: &str,
    answer: &str,
    profile_snippets: &[String],
    missing: &[RubricComponent],
) -> String {
    let snippets = if profile_snippets.is_empty() {
        "(none)".to_string()
    } else {
        profile_snippets
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let missing = if missing.is_empty() {
        "none".to_string()
    } else {
        missing
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ")
    };

    COACH_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{star_guide}", star_guide)
        .replace("{question}", question)
        .replace("{answer}", answer)
        .replace("{profile_snippets}", &snippets)
        .replace("{missing_components}", &missing)
}

pub fn strict_addendum(violations: &[String]) -> String {
    STRICT_ADDENDUM_TEMPLATE.replace("{violations}", &violations.join(", "))
}
