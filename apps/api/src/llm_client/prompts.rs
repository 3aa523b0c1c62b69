// Shared prompt fragments and prompt-building utilities.
// Each flow's own template lives in flows::prompts.

/// Appended to every system instruction.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with a single valid JSON object \
    matching the requested schema. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Regional framing shared by the agronomy flows.
pub const REGION_CONTEXT: &str = "You advise smallholder farmers and agricultural \
    administrators in the Davao region of the Philippines. Prefer practical measures \
    that are available and affordable locally.";

/// Builds a flow's system instruction from its role line.
pub fn system_instruction(role: &str) -> String {
    format!("{role} {REGION_CONTEXT} {JSON_ONLY_SYSTEM}")
}
