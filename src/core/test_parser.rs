use crate::domain::model::TestCase;
use once_cell::sync::Lazy;
use regex::Regex;

const UNTITLED: &str = "Untitled Test Case";

static ID_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:[#*]+[ \t]*)?(?i:test[ \t]+(?:id|case))(?:\*\*)?[ \t]*:[ \t]*(?:\*\*)?[ \t]*(?P<rest>[^\n]*)",
    )
    .expect("test id pattern")
});

static NUMBERED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\.[ \t]*(?P<prefix>(?i:test[ \t]+case)[ \t]*:?[ \t]*)?(?P<rest>[^\n]*)")
        .expect("numbered id pattern")
});

static HEADING_CASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#+[ \t]*(?:Test Case|TC)[: \t-]+(\d+)[: \t-]+([^\n]+)")
        .expect("heading case pattern")
});

static FIELD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:[-*#]+[ \t]*)?(?:\*\*)?(Test[ \t]+Objective|Objective|Preconditions|Prerequisites|Test[ \t]+Data|Test[ \t]+Steps|Steps|Expected[ \t]+Results|Results|Related[ \t]+Rules)(?:\*\*)?[ \t]*:(?:\*\*)?",
    )
    .expect("field label pattern")
});

static NUMBERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[.)][ \t]*(.+)$").expect("numbered item pattern"));
static BULLET_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-*•][ \t]*(.+)$").expect("bullet item pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Objective,
    Preconditions,
    TestData,
    Steps,
    Results,
    RelatedRules,
}

impl Field {
    fn from_label(label: &str) -> Self {
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match label.as_str() {
            "test objective" | "objective" => Field::Objective,
            "preconditions" | "prerequisites" => Field::Preconditions,
            "test data" => Field::TestData,
            "test steps" | "steps" => Field::Steps,
            "related rules" => Field::RelatedRules,
            _ => Field::Results,
        }
    }
}

/// Parses a test-generation answer. Returns an empty list when no layout is recognised.
pub fn parse_test_script_response(text: &str) -> Vec<TestCase> {
    if text.trim().is_empty() {
        tracing::warn!("⚠️ Empty test script response");
        return Vec::new();
    }

    let mut cases = parse_marked_cases(text);
    if cases.is_empty() {
        cases = parse_numbered_cases(text);
    }
    if cases.is_empty() {
        cases = parse_heading_cases(text);
    }

    tracing::debug!("Parsed {} test cases from response", cases.len());
    cases
}

/// Where a case header ends and what it names.
struct Header {
    start: usize,
    end: usize,
    id: Option<String>,
    title: String,
}

/// Splits the text after a `Test ID:` style marker into an id token, or a
/// title when the first word is not an id.
fn header_from_rest(start: usize, rest: regex::Match<'_>) -> Header {
    let token = rest
        .as_str()
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(|c| c == '*' || c == ':'))
        .filter(|t| is_test_id(t));

    match token.and_then(|t| rest.as_str().find(t).map(|at| (t, at))) {
        Some((token, at)) => Header {
            start,
            end: rest.start() + at + token.len(),
            id: Some(token.to_string()),
            title: String::new(),
        },
        None => Header {
            start,
            end: rest.end(),
            id: None,
            title: rest.as_str().replace("**", "").trim().to_string(),
        },
    }
}

/// `X800DN-TC-001`, `TC1`: ids always carry a digit.
fn is_test_id(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn generated_id(index: usize) -> String {
    format!("TC-{:03}", index + 1)
}

fn parse_marked_cases(text: &str) -> Vec<TestCase> {
    let markers: Vec<Header> = ID_MARKER
        .captures_iter(text)
        .filter_map(|caps| Some(header_from_rest(caps.get(0)?.start(), caps.name("rest")?)))
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let next = markers.get(i + 1).map_or(text.len(), |m| m.start);
            let id = header.id.clone().unwrap_or_else(|| generated_id(i));
            let mut case = case_from_fields(&id, &text[header.end..next]);
            if case.title == UNTITLED && !header.title.is_empty() {
                case.title = header.title.clone();
                case.description = header.title.clone();
            }
            case
        })
        .collect()
}

fn case_from_fields(test_id: &str, content: &str) -> TestCase {
    let labels: Vec<(usize, usize, Field)> = FIELD_LABEL
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), Field::from_label(&caps[1])))
        })
        .collect();

    let mut case = TestCase::titled(test_id, UNTITLED);

    for (i, (_, end, field)) in labels.iter().enumerate() {
        let next = labels.get(i + 1).map_or(content.len(), |l| l.0);
        let value = content[*end..next].trim();

        match field {
            Field::Objective => {
                let lines = clean_lines(value);
                if let Some(first) = lines.first() {
                    case.title = first.clone();
                    case.description = lines.join(" ");
                }
            }
            Field::Preconditions => case.prerequisites = marked_items(value),
            Field::TestData => case.test_data = key_values(value),
            Field::Steps => case.steps = step_items(value),
            Field::Results => case.expected_results = marked_items(value),
            Field::RelatedRules => {
                case.related_rules = clean_lines(value)
                    .iter()
                    .flat_map(|line| line.split(','))
                    .map(|rule| rule.trim().to_string())
                    .filter(|rule| !rule.is_empty() && !is_none(rule))
                    .collect()
            }
        }
    }

    case
}

fn parse_numbered_cases(text: &str) -> Vec<TestCase> {
    let markers: Vec<Header> = NUMBERED_ID
        .captures_iter(text)
        .filter_map(|caps| {
            let header = header_from_rest(caps.get(0)?.start(), caps.name("rest")?);
            let prefixed = caps.name("prefix").is_some();
            let looks_like_id = match &header.id {
                Some(id) => prefixed || id.contains('-'),
                None => prefixed && !header.title.is_empty(),
            };
            looks_like_id.then_some(header)
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let next = markers.get(i + 1).map_or(text.len(), |m| m.start);
            let id = header.id.clone().unwrap_or_else(|| generated_id(i));
            let title = Some(header.title.clone())
                .filter(|title| !title.is_empty())
                .or_else(|| {
                    clean_lines(&text[header.end..next])
                        .into_iter()
                        .map(|line| line.trim_start_matches([':', '-']).trim().to_string())
                        .find(|line| !line.is_empty())
                })
                .unwrap_or_else(|| UNTITLED.to_string());
            TestCase::titled(id, title)
        })
        .collect()
}

fn parse_heading_cases(text: &str) -> Vec<TestCase> {
    HEADING_CASE
        .captures_iter(text)
        .map(|caps| TestCase::titled(format!("TC-{}", &caps[1]), caps[2].trim()))
        .collect()
}

fn clean_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().replace("**", ""))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn capture_items(lines: &[String], pattern: &Regex) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| pattern.captures(line).map(|c| c[1].trim().to_string()))
        .collect()
}

/// Numbered or bulleted items, else every non-empty line.
fn marked_items(text: &str) -> Vec<String> {
    let lines = clean_lines(text);
    let items: Vec<String> = lines
        .iter()
        .filter_map(|line| {
            NUMBERED_ITEM
                .captures(line)
                .or_else(|| BULLET_ITEM.captures(line))
                .map(|c| c[1].trim().to_string())
        })
        .collect();

    let items = if items.is_empty() { lines } else { items };
    items.into_iter().filter(|item| !is_none(item)).collect()
}

/// Numbered items, else bulleted items, else every non-empty line.
fn step_items(text: &str) -> Vec<String> {
    let lines = clean_lines(text);
    let numbered = capture_items(&lines, &NUMBERED_ITEM);
    if !numbered.is_empty() {
        return numbered;
    }
    let bulleted = capture_items(&lines, &BULLET_ITEM);
    if !bulleted.is_empty() {
        return bulleted;
    }
    lines
}

fn key_values(text: &str) -> Vec<(String, String)> {
    marked_items(text)
        .iter()
        .filter_map(|item| item.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn is_none(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "none" | "n/a" | "none.")
}

fn default_case(
    test_id: String,
    title: &str,
    description: &str,
    prerequisites: &[&str],
    data: (&str, &str),
    steps: &[&str],
    expected: &[&str],
) -> TestCase {
    TestCase {
        test_id,
        title: title.to_string(),
        description: description.to_string(),
        prerequisites: prerequisites.iter().map(|s| s.to_string()).collect(),
        test_data: vec![(data.0.to_string(), data.1.to_string())],
        steps: steps.iter().map(|s| s.to_string()).collect(),
        expected_results: expected.iter().map(|s| s.to_string()).collect(),
        related_rules: Vec::new(),
    }
}

/// Basic Functionality, Validation and Integration cases used when nothing could be parsed.
pub fn default_test_cases(program_name: &str) -> Vec<TestCase> {
    vec![
        default_case(
            format!("{}-TC-001", program_name),
            "Basic Functionality Test",
            "Verify the basic functionality of the program",
            &["Test environment is available"],
            ("input", "test value"),
            &["Start the program", "Enter valid test data", "Submit the transaction"],
            &["Transaction processes successfully", "Data is stored correctly"],
        ),
        default_case(
            format!("{}-TC-002", program_name),
            "Validation Test",
            "Verify input validation functionality",
            &["Test environment is available"],
            ("invalid_input", "invalid value"),
            &["Start the program", "Enter invalid test data", "Submit the transaction"],
            &["System rejects the transaction", "Appropriate error message is displayed"],
        ),
        default_case(
            format!("{}-TC-003", program_name),
            "Integration Test",
            "Verify integration with external systems",
            &["Test environment is available", "External systems are accessible"],
            ("integration_data", "test value"),
            &[
                "Start the program",
                "Enter data that triggers external system integration",
                "Submit the transaction",
            ],
            &[
                "System correctly integrates with external systems",
                "Data is exchanged properly",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATTED_ANSWER: &str = "\
Here are the test cases for X800DN.

Test ID: X800DN-TC-001
Test Objective: Verify customer lookup with a valid id
Preconditions:
1. Customer 0000012345 exists
2. Operator is signed on
Test Data:
- PF-KEY: ENTER
- CUSTOMER-ID: 0000012345
Test Steps:
1. Enter customer id on X800MAP
2. Press ENTER
Expected Results:
- Customer name is displayed
- Balance matches the database
Related Rules: RULE_1, RULE_2

**Test ID:** X800DN-TC-002
**Test Objective:** Reject an unknown customer
Preconditions: None
Test Steps:
- Enter customer id 9999999999
- Press ENTER
Expected Results:
Message CU001 is shown
";

    #[test]
    fn test_parses_marked_test_cases() {
        let cases = parse_test_script_response(FORMATTED_ANSWER);
        assert_eq!(cases.len(), 2);

        let first = &cases[0];
        assert_eq!(first.test_id, "X800DN-TC-001");
        assert_eq!(first.title, "Verify customer lookup with a valid id");
        assert_eq!(first.description, first.title);
        assert_eq!(
            first.prerequisites,
            vec!["Customer 0000012345 exists", "Operator is signed on"]
        );
        // 保留模型列出的順序
        assert_eq!(
            first.test_data,
            vec![
                ("PF-KEY".to_string(), "ENTER".to_string()),
                ("CUSTOMER-ID".to_string(), "0000012345".to_string()),
            ]
        );
        assert_eq!(first.steps, vec!["Enter customer id on X800MAP", "Press ENTER"]);
        assert_eq!(
            first.expected_results,
            vec!["Customer name is displayed", "Balance matches the database"]
        );
        assert_eq!(first.related_rules, vec!["RULE_1", "RULE_2"]);

        let second = &cases[1];
        assert_eq!(second.test_id, "X800DN-TC-002");
        assert_eq!(second.title, "Reject an unknown customer");
        assert!(second.prerequisites.is_empty());
        assert_eq!(second.steps, vec!["Enter customer id 9999999999", "Press ENTER"]);
        assert_eq!(second.expected_results, vec!["Message CU001 is shown"]);
    }

    #[test]
    fn test_parses_numbered_test_cases() {
        let text = "\
1. Test Case: B100DB-TC-001
Posting of a valid payment

2. Test Case: B100DB-TC-002
Rejecting a zero amount
";
        let cases = parse_test_script_response(text);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test_id, "B100DB-TC-001");
        assert_eq!(cases[0].title, "Posting of a valid payment");
        assert_eq!(cases[1].title, "Rejecting a zero amount");
    }

    #[test]
    fn test_title_after_marker_is_not_an_id() {
        let text = "\
Test Case: Verify login
Steps:
1. Sign on
Expected Results:
- Menu is shown

Test Case: TC7 Reject a bad password
Test Objective: Reject a bad password
";
        let cases = parse_test_script_response(text);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test_id, "TC-001");
        assert_eq!(cases[0].title, "Verify login");
        assert_eq!(cases[0].steps, vec!["Sign on"]);
        assert_eq!(cases[1].test_id, "TC7");
        assert_eq!(cases[1].title, "Reject a bad password");

        let numbered = parse_test_script_response("1. Test Case: Verify logout\n2. Test Case: B100DB-TC-002\nPost a payment\n");
        assert_eq!(numbered[0].test_id, "TC-001");
        assert_eq!(numbered[0].title, "Verify logout");
        assert_eq!(numbered[1].test_id, "B100DB-TC-002");
        assert_eq!(numbered[1].title, "Post a payment");
    }

    #[test]
    fn test_numbered_steps_are_not_test_cases() {
        let text = "1. Start the program\n2. F3 returns to menu\n";
        assert!(parse_test_script_response(text).is_empty());
    }

    #[test]
    fn test_parses_heading_test_cases() {
        let text = "# Test Case 1: Basic Functionality\nsome text\n## Test Case 2 - Error Handling\n";
        let cases = parse_test_script_response(text);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test_id, "TC-1");
        assert_eq!(cases[0].title, "Basic Functionality");
        assert_eq!(cases[1].test_id, "TC-2");
        assert_eq!(cases[1].title, "Error Handling");
    }

    #[test]
    fn test_unrecognised_or_empty_response() {
        assert!(parse_test_script_response("").is_empty());
        assert!(parse_test_script_response("I cannot help with that.").is_empty());
    }

    #[test]
    fn test_default_test_cases_use_program_name() {
        let cases = default_test_cases("X800DN");
        let ids: Vec<_> = cases.iter().map(|c| c.test_id.as_str()).collect();
        assert_eq!(ids, vec!["X800DN-TC-001", "X800DN-TC-002", "X800DN-TC-003"]);
        assert_eq!(cases[2].title, "Integration Test");
        assert_eq!(
            cases[1].test_data,
            vec![("invalid_input".to_string(), "invalid value".to_string())]
        );
    }
}
