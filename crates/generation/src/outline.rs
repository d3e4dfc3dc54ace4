//! Roadmap outline planner
//!
//! Asks the model for a strict-JSON week-by-week outline, validates it, and
//! re-prompts with the validation error when the reply doesn't hold up.
//! Each attempt gets two parse chances: the whole reply, then the first
//! balanced JSON object salvaged out of it (models like to wrap JSON in
//! prose or code fences).

use serde::{Deserialize, Serialize};

use coursecraft_llm::{extract_first_json_object, ChatClient};

use crate::{GenerationError, GenerationResult};

/// Parse-then-repair attempts before giving up
const MAX_ATTEMPTS: usize = 3;

const PLANNER_TEMPERATURE: f64 = 0.1;

const SYSTEM_PLANNER: &str = "You are a curriculum planner.

You must return ONLY valid JSON (no markdown, no code fences, no commentary).
The JSON must match the given schema exactly.
";

/// One planned week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub week: i32,
    pub title: String,
    pub outcomes: Vec<String>,
}

/// The full planned outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapOutline {
    pub weeks: Vec<WeekPlan>,
}

/// Build the planner user prompt
#[must_use]
pub fn build_planner_prompt(
    field: &str,
    level: &str,
    weekly_hours: i32,
    duration_weeks: i32,
) -> String {
    format!(
        r#"Create a {duration_weeks}-week learning roadmap for: {field}
Learner level: {level}
Time budget: {weekly_hours} hours/week

Output must be STRICT JSON matching this schema:
{{
  "weeks": [
    {{"week": 1, "title": "string", "outcomes": ["string", "string"]}}
  ]
}}

Rules:
- "weeks" must contain exactly {duration_weeks} items.
- Each week.week must be 1..{duration_weeks} with no duplicates, in increasing order.
- outcomes: 2-6 items per week, each short and specific.
- Titles must be concise."#
    )
}

/// Check an outline against the planner rules
pub fn validate_outline(outline: &RoadmapOutline, duration_weeks: i32) -> Result<(), String> {
    if outline.weeks.len() != duration_weeks as usize {
        return Err(format!(
            "Expected {duration_weeks} weeks, got {}",
            outline.weeks.len()
        ));
    }

    let nums: Vec<i32> = outline.weeks.iter().map(|w| w.week).collect();
    let expected: Vec<i32> = (1..=duration_weeks).collect();
    if nums != expected {
        return Err(format!(
            "Week numbers must be exactly 1..{duration_weeks} in order, got {nums:?}"
        ));
    }

    for week in &outline.weeks {
        if week.title.trim().is_empty() {
            return Err(format!("Week {} title is empty", week.week));
        }
        if week.outcomes.len() < 2 || week.outcomes.len() > 6 {
            return Err(format!(
                "Week {} must have 2-6 outcomes, got {}",
                week.week,
                week.outcomes.len()
            ));
        }
        for outcome in &week.outcomes {
            if outcome.trim().is_empty() {
                return Err(format!("Week {} has empty outcome", week.week));
            }
        }
    }

    Ok(())
}

fn parse_and_validate(text: &str, duration_weeks: i32) -> Result<RoadmapOutline, String> {
    let outline: RoadmapOutline = serde_json::from_str(text).map_err(|e| e.to_string())?;
    validate_outline(&outline, duration_weeks)?;
    Ok(outline)
}

/// Plan a roadmap outline
///
/// # Errors
///
/// Returns [`GenerationError::Llm`] on transport failure and
/// [`GenerationError::OutlineRetriesExhausted`] when no attempt produced a
/// valid outline.
pub async fn plan_outline(
    client: &dyn ChatClient,
    field: &str,
    level: &str,
    weekly_hours: i32,
    duration_weeks: i32,
) -> GenerationResult<RoadmapOutline> {
    let base_prompt = build_planner_prompt(field, level, weekly_hours, duration_weeks);
    let mut user_prompt = base_prompt.clone();
    let mut last_error = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        let raw = client
            .generate_text(SYSTEM_PLANNER, &user_prompt, PLANNER_TEMPERATURE)
            .await?;

        // Whole reply first
        match parse_and_validate(&raw, duration_weeks) {
            Ok(outline) => return Ok(outline),
            Err(e) => last_error = e,
        }

        // Then the first balanced JSON object embedded in the reply
        let salvaged = extract_first_json_object(&raw);
        if let Some(candidate) = salvaged {
            match parse_and_validate(candidate, duration_weeks) {
                Ok(outline) => return Ok(outline),
                Err(e) => last_error = e,
            }
        }

        tracing::warn!(attempt, error = %last_error, "planner output failed validation");

        let invalid_output = salvaged.unwrap_or(&raw);
        user_prompt = format!(
            r"{base_prompt}

PREVIOUS ATTEMPT FAILED:
Error: {last_error}

Invalid output:
{invalid_output}

Return ONLY corrected JSON, no extra keys, no markdown.
Must have exactly {duration_weeks} weeks with numbers 1..{duration_weeks}.
Each week needs 2-6 outcomes and non-empty title."
        );
    }

    Err(GenerationError::OutlineRetriesExhausted {
        attempts: MAX_ATTEMPTS,
        last_error,
    })
}
