//! Weekly module writer
//!
//! Produces one week's lesson as Markdown with a fixed H2 skeleton. The
//! reply is validated structurally; one repair round-trip is allowed before
//! the job fails.

use coursecraft_llm::ChatClient;

use crate::{GenerationError, GenerationResult};

const WRITE_TEMPERATURE: f64 = 0.2;
const REPAIR_TEMPERATURE: f64 = 0.1;

const SYSTEM_MODULE_WRITER: &str = "You are an expert course author.
Write clear, structured Markdown only.
No JSON. No code fences unless showing actual code examples.
Output must contain exactly these H2 headings in order:
## Overview
## Key concepts
## Worked example
## Practice exercises
## Common mistakes
## Suggested resources
No other top-level headings (# or ##) allowed.
";

/// Required H2 skeleton, in order
const REQUIRED_HEADINGS: [&str; 6] = [
    "## Overview",
    "## Key concepts",
    "## Worked example",
    "## Practice exercises",
    "## Common mistakes",
    "## Suggested resources",
];

/// Fields whose worked example should contain code
const PROGRAMMING_KEYWORDS: [&str; 8] = [
    "python",
    "ml",
    "machine learning",
    "data",
    "pandas",
    "numpy",
    "deep learning",
    "nlp",
];

fn is_programming_field(field: &str) -> bool {
    let field = field.to_lowercase();
    PROGRAMMING_KEYWORDS.iter().any(|kw| field.contains(kw))
}

/// Build the module-writer user prompt
#[must_use]
pub fn build_module_prompt(
    field: &str,
    level: &str,
    week: i32,
    title: &str,
    outcomes: &[String],
) -> String {
    let outcomes_text: String = outcomes
        .iter()
        .map(|o| format!("- {o}"))
        .collect::<Vec<_>>()
        .join("\n");

    let worked_example_guidance = if is_programming_field(field) {
        "Worked example (with Python code)"
    } else {
        "Worked example (code OR step-by-step walkthrough)"
    };

    format!(
        r"Course topic: {field}
Learner level: {level}

Week {week} title: {title}
Outcomes:
{outcomes_text}

Write a markdown lesson with these EXACT headings (use H2 ## format):
## Overview
## Key concepts
## {worked_example_guidance}
## Practice exercises (exactly 3 numbered items)
## Common mistakes
## Suggested resources

Requirements:
- Output must be Markdown only
- Use exactly these 6 headings in this order
- No additional top-level headings
- Practice exercises section must have exactly 3 numbered items
- Keep content practical and concise"
    )
}

/// Strip a trailing parenthetical from an H2 heading
///
/// The prompt invites suffixes like "(with Python code)"; the skeleton check
/// compares against the bare heading.
fn normalize_heading(line: &str) -> &str {
    let line = line.trim_end();
    if line.ends_with(')') {
        if let Some(open) = line.rfind(" (") {
            return line[..open].trim_end();
        }
    }
    line
}

/// Check a lesson against the required skeleton
pub fn validate_module_markdown(md: &str) -> Result<(), String> {
    let mut found_headings = Vec::new();
    let mut numbered_exercises = 0usize;
    let mut in_practice_section = false;

    for line in md.lines() {
        let line = line.trim();
        if line.starts_with("## ") {
            let heading = normalize_heading(line).to_string();
            in_practice_section = heading == "## Practice exercises";
            found_headings.push(heading);
        } else if in_practice_section
            && line
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            numbered_exercises += 1;
        }
    }

    if found_headings != REQUIRED_HEADINGS {
        let missing: Vec<&&str> = REQUIRED_HEADINGS
            .iter()
            .filter(|h| !found_headings.iter().any(|f| f == **h))
            .collect();
        let extra: Vec<&String> = found_headings
            .iter()
            .filter(|f| !REQUIRED_HEADINGS.contains(&f.as_str()))
            .collect();
        let mut error = "Invalid headings structure".to_string();
        if !missing.is_empty() {
            error.push_str(&format!(". Missing: {missing:?}"));
        }
        if !extra.is_empty() {
            error.push_str(&format!(". Extra: {extra:?}"));
        }
        return Err(error);
    }

    if numbered_exercises != 3 {
        return Err(format!(
            "Practice exercises must have exactly 3 numbered items, found {numbered_exercises}"
        ));
    }

    Ok(())
}

/// Write one module's Markdown lesson
///
/// # Errors
///
/// Returns [`GenerationError::Llm`] on transport failure and
/// [`GenerationError::MarkdownRepairFailed`] when the repaired reply still
/// fails validation.
pub async fn write_module(
    client: &dyn ChatClient,
    field: &str,
    level: &str,
    week: i32,
    title: &str,
    outcomes: &[String],
) -> GenerationResult<String> {
    let prompt = build_module_prompt(field, level, week, title, outcomes);

    let markdown = client
        .generate_text(SYSTEM_MODULE_WRITER, &prompt, WRITE_TEMPERATURE)
        .await?
        .trim()
        .to_string();

    let error = match validate_module_markdown(&markdown) {
        Ok(()) => return Ok(markdown),
        Err(e) => e,
    };

    tracing::warn!(week, error = %error, "module markdown failed validation, repairing");

    let repair_prompt = format!(
        r"{prompt}

PREVIOUS ATTEMPT FAILED:
Error: {error}

Invalid markdown:
{markdown}

Return corrected markdown only. Fix the structure errors while preserving content quality."
    );

    let repaired = client
        .generate_text(SYSTEM_MODULE_WRITER, &repair_prompt, REPAIR_TEMPERATURE)
        .await?
        .trim()
        .to_string();

    validate_module_markdown(&repaired).map_err(GenerationError::MarkdownRepairFailed)?;
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecraft_llm::LlmResult;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedClient {
        fn new<S: AsRef<str>>(replies: &[S]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.as_ref().to_string()).collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatClient for ScriptedClient {
        async fn generate_text(
            &self,
            _system: &str,
            _user: &str,
            _temperature: f64,
        ) -> LlmResult<String> {
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted client ran out of replies"))
        }
    }

    fn valid_lesson() -> String {
        r"## Overview
Intro text.

## Key concepts
- concept

## Worked example (with Python code)
Example body.

## Practice exercises
1. First exercise
2. Second exercise
3. Third exercise

## Common mistakes
- mistake

## Suggested resources
- resource"
            .to_string()
    }

    #[test]
    fn test_is_programming_field() {
        assert!(is_programming_field("Machine Learning"));
        assert!(is_programming_field("data engineering"));
        assert!(!is_programming_field("watercolor painting"));
    }

    #[test]
    fn test_module_prompt_guidance() {
        let outcomes = vec!["learn pandas".to_string(), "clean data".to_string()];
        let prompt = build_module_prompt("pandas", "beginner", 2, "DataFrames", &outcomes);
        assert!(prompt.contains("Worked example (with Python code)"));
        assert!(prompt.contains("- learn pandas"));

        let prompt = build_module_prompt("gardening", "beginner", 1, "Soil", &outcomes);
        assert!(prompt.contains("code OR step-by-step walkthrough"));
    }

    #[test]
    fn test_validate_accepts_well_formed_lesson() {
        assert!(validate_module_markdown(&valid_lesson()).is_ok());
    }

    #[test]
    fn test_validate_accepts_parenthetical_heading_suffix() {
        let lesson = valid_lesson().replace(
            "## Practice exercises",
            "## Practice exercises (exactly 3 numbered items)",
        );
        assert!(validate_module_markdown(&lesson).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_heading() {
        let lesson = valid_lesson().replace("## Common mistakes\n- mistake\n\n", "");
        let err = validate_module_markdown(&lesson).unwrap_err();
        assert!(err.contains("Invalid headings structure"));
        assert!(err.contains("Common mistakes"));
    }

    #[test]
    fn test_validate_rejects_out_of_order_headings() {
        let lesson = r"## Key concepts
text

## Overview
text

## Worked example
text

## Practice exercises
1. a
2. b
3. c

## Common mistakes
text

## Suggested resources
text";
        assert!(validate_module_markdown(lesson).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_exercise_count() {
        let lesson = valid_lesson().replace("3. Third exercise\n", "");
        let err = validate_module_markdown(&lesson).unwrap_err();
        assert!(err.contains("exactly 3 numbered items"));
        assert!(err.contains("found 2"));
    }

    #[tokio::test]
    async fn test_write_module_first_attempt() {
        let lesson = valid_lesson();
        let client = ScriptedClient::new(&[&lesson]);
        let outcomes = vec!["a".to_string(), "b".to_string()];
        let md = write_module(&client, "rust", "beginner", 1, "Ownership", &outcomes)
            .await
            .unwrap();
        assert!(md.starts_with("## Overview"));
    }

    #[tokio::test]
    async fn test_write_module_repairs_once() {
        let lesson = valid_lesson();
        let client = ScriptedClient::new(&["## Overview only", &lesson]);
        let outcomes = vec!["a".to_string(), "b".to_string()];
        let md = write_module(&client, "rust", "beginner", 1, "Ownership", &outcomes)
            .await
            .unwrap();
        assert!(validate_module_markdown(&md).is_ok());
    }

    #[tokio::test]
    async fn test_write_module_fails_after_repair() {
        let client = ScriptedClient::new(&["## Overview only", "still broken"]);
        let outcomes = vec!["a".to_string(), "b".to_string()];
        let err = write_module(&client, "rust", "beginner", 1, "Ownership", &outcomes)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MarkdownRepairFailed(_)));
    }
}
