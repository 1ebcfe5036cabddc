//! Turns the free-form text of an extraction answer into a [`BusinessLogic`] record.
//!
//! Models rarely follow one layout, so each section heading is looked up with
//! three layers of patterns (bold, plain with a colon or dash, markdown `#`).
//! Headings count only at the start of a line, never behind an item number.
//! A section runs until one of the headings that may follow it, and its
//! numbered items become records.

use crate::domain::model::{
    BusinessLogic, BusinessRule, Direction, IntegrationPoint, IntegrationType, ProgramType,
    SpecialCase, Validation,
};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_PROGRAM_NAME: &str = "Unnamed Program";
pub const DEFAULT_PURPOSE: &str = "Purpose not explicitly specified in the extracted text.";

const NO_DESCRIPTION: &str = "Description not specified";
const NO_IMPLEMENTATION: &str = "Implementation details not specified";
const NO_FIELD: &str = "Unspecified Field";
const NO_RULE: &str = "Validation rule not specified";
const NO_CONDITION: &str = "Unspecified Condition";
const NO_HANDLING: &str = "Handling not specified";
const NO_INTEGRATION_NAME: &str = "Unnamed Integration Point";

// 不可當作程式名稱的通用字
const GENERIC_NAMES: [&str; 12] = [
    "IDMS", "COBOL", "DC", "DB", "IDMS-DC", "IDMS-DB", "THE", "THIS", "IT", "API", "SQL", "PROGRAM",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    CoreRules,
    Validations,
    SpecialCases,
    IntegrationPoints,
    ScreenFlow,
    ErrorHandling,
    Conclusion,
}

static SECTIONS: [Section; 7] = [
    Section::CoreRules,
    Section::Validations,
    Section::SpecialCases,
    Section::IntegrationPoints,
    Section::ScreenFlow,
    Section::ErrorHandling,
    Section::Conclusion,
];

impl Section {
    fn title(self) -> &'static str {
        match self {
            Section::CoreRules => "Core Business Rules",
            Section::Validations => "Data Validation Rules",
            Section::SpecialCases => "Special Processing Rules",
            Section::IntegrationPoints => "Integration Points",
            Section::ScreenFlow => "Screen Flow Logic",
            Section::ErrorHandling => "Error Handling",
            Section::Conclusion => "Conclusion",
        }
    }

    /// Headings that close this section: the ones that may follow it.
    fn terminators(self) -> &'static [Section] {
        &SECTIONS[self as usize + 1..]
    }
}

struct HeadingPatterns {
    section: Section,
    layers: [Regex; 3],
}

impl HeadingPatterns {
    fn compile(section: Section) -> Self {
        let t = section
            .title()
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");

        // 只認行首的標題，編號項目 (`2. **Error Handling:**`) 不算
        let layers = [
            format!(r"(?im)^[ \t]*(?:#{{1,6}}[ \t]*)?\*\*[ \t]*{t}[^*\n]*\*\*[ \t]*:?"),
            format!(r"(?im)^[ \t]*{t}[^:\n]*?[ \t]*(?::|[ \t]-)"),
            format!(r"(?im)^[ \t]*#{{1,6}}[ \t]*{t}[^\n]*$"),
        ]
        .map(|p| Regex::new(&p).expect("heading pattern"));

        Self { section, layers }
    }
}

static HEADINGS: Lazy<Vec<HeadingPatterns>> =
    Lazy::new(|| SECTIONS.iter().map(|&s| HeadingPatterns::compile(s)).collect());

static PROGRAM_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i:program\s+name)\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*([A-Z][A-Z0-9_-]+)\b",
        r"(?i:program\s+name\s+is)\s+(?:\*\*)?([A-Z][A-Z0-9_-]+)\b",
        r"\b([A-Z][A-Z0-9_-]+)\s+(?i:program\b|is\s+designed|allows)",
        r"\b([A-Z][A-Z0-9_-]+)\s+(?i:is\s+an?\b|provides)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("program name pattern"))
    .collect()
});

static PURPOSE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)Program\s+Purpose(?:\s+Statement)?\s*:?(?:\s*\*\*)?[ \t]*:?[ \t]*\n?(.*?)(?:\n\s*\n|\n\s*\*\*|\z)",
        r"(?s)The\s+[A-Z0-9_-]+\s+program\s+is\s+designed\s+to\s+(.*?)(?:\n\s*\n|\z)",
        r"(?s)Purpose:(.*?)(?:\n\s*\n|\n\s*\*\*|\z)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("purpose pattern"))
    .collect()
});

static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*").expect("line break pattern"));

static ITEM_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*\d+[.)][ \t]*(?:\*\*(?P<bold>[^*\n]+?)\*\*[ \t]*:?|(?P<plain>[^:\n*]+):)(?P<rest>[^\n]*)",
    )
    .expect("item header pattern")
});

static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\*\*)?[ \t]*(Implementation|Business\s+Intent|Validation\s+Constraints|Exceptional\s+Handling\s+Scenarios|Direction)[ \t]*(?:\*\*)?[ \t]*:[ \t]*(?:\*\*)?",
    )
    .expect("label pattern")
});

/// Parses one extraction answer. `program_id_hint` is the PROGRAM-ID scraped
/// from the source, used when the answer never names the program.
pub fn parse_business_logic(
    text: &str,
    program_type: ProgramType,
    program_id_hint: Option<&str>,
) -> BusinessLogic {
    let program_name = find_program_name(text)
        .or_else(|| {
            program_id_hint
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());
    let program_purpose = find_purpose(text).unwrap_or_else(|| DEFAULT_PURPOSE.to_string());

    let mut logic = BusinessLogic::new(program_name, program_type, program_purpose);

    if let Some(body) = section_body(text, Section::CoreRules) {
        logic.core_rules = numbered_items(body)
            .into_iter()
            .enumerate()
            .map(|(i, item)| parse_rule(i + 1, &item))
            .collect();
    }
    if let Some(body) = section_body(text, Section::Validations) {
        logic.validations = numbered_items(body).iter().map(parse_validation).collect();
    }
    if let Some(body) = section_body(text, Section::SpecialCases) {
        logic.special_cases = numbered_items(body).iter().map(parse_special_case).collect();
    }
    if let Some(body) = section_body(text, Section::IntegrationPoints) {
        logic.integration_points = numbered_items(body)
            .iter()
            .map(parse_integration_point)
            .collect();
    }

    let mut note_sections = vec![Section::ErrorHandling, Section::Conclusion];
    if program_type.is_online() {
        note_sections.insert(0, Section::ScreenFlow);
    }
    for section in note_sections {
        if let Some(body) = section_body(text, section).filter(|b| !b.is_empty()) {
            logic.append_note(&format!("{}:\n{}", section.title(), body));
        }
    }

    tracing::debug!(
        "Parsed {}: {} rules, {} validations, {} special cases, {} integration points",
        logic.program_name,
        logic.core_rules.len(),
        logic.validations.len(),
        logic.special_cases.len(),
        logic.integration_points.len()
    );

    logic
}

fn find_program_name(text: &str) -> Option<String> {
    PROGRAM_NAME_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .find(|name| !GENERIC_NAMES.contains(&name.as_str()))
    })
}

fn find_purpose(text: &str) -> Option<String> {
    PURPOSE_PATTERNS.iter().find_map(|pattern| {
        let captured = pattern.captures(text)?.get(1)?.as_str().trim();
        let cleaned = captured.replace("**", "");
        let cleaned = LINE_BREAKS.replace_all(cleaned.trim(), " ").trim().to_string();
        (!cleaned.is_empty()).then_some(cleaned)
    })
}

fn section_body(text: &str, section: Section) -> Option<&str> {
    let patterns = HEADINGS.iter().find(|h| h.section == section)?;
    let heading = patterns.layers.iter().find_map(|re| re.find(text))?;
    let start = heading.end();

    let end = HEADINGS
        .iter()
        .filter(|h| section.terminators().contains(&h.section))
        .flat_map(|h| h.layers.iter())
        .filter_map(|re| re.find_at(text, start))
        .map(|m| m.start())
        .min()
        .unwrap_or(text.len());

    Some(text[start..end].trim())
}

#[derive(Debug)]
struct Item {
    title: String,
    body: String,
}

fn numbered_items(section: &str) -> Vec<Item> {
    let headers: Vec<(usize, usize, String, String)> = ITEM_HEADER
        .captures_iter(section)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = caps
                .name("bold")
                .or_else(|| caps.name("plain"))?
                .as_str()
                .trim()
                .trim_end_matches(':')
                .trim()
                .to_string();
            let rest = caps.name("rest").map_or("", |m| m.as_str()).to_string();
            Some((whole.start(), whole.end(), title, rest))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(i, (_, end, title, rest))| {
            let next = headers.get(i + 1).map_or(section.len(), |h| h.0);
            Item {
                title: title.clone(),
                body: format!("{}{}", rest, &section[*end..next]),
            }
        })
        .collect()
}

/// Value of the first of `wanted` labels in `body`, up to the next label.
fn labelled(body: &str, wanted: &[&str]) -> Option<String> {
    let marks: Vec<(usize, usize, String)> = LABEL
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
            Some((whole.start(), whole.end(), name))
        })
        .collect();

    marks.iter().enumerate().find_map(|(i, (_, end, name))| {
        if !wanted.iter().any(|w| w.eq_ignore_ascii_case(name)) {
            return None;
        }
        let stop = marks.get(i + 1).map_or(body.len(), |m| m.0);
        let value = tidy(&body[*end..stop]);
        (!value.is_empty()).then_some(value)
    })
}

/// Item text before its first labelled sub-field.
fn lead(body: &str) -> String {
    let stop = LABEL.find(body).map_or(body.len(), |m| m.start());
    let before = tidy(&body[..stop]);
    if before.is_empty() {
        tidy(body)
    } else {
        before
    }
}

fn tidy(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !matches!(*line, "-" | "*" | "•"))
        .collect::<Vec<_>>()
        .join(" ")
        .replace("**", "")
        .trim()
        .to_string()
}

fn or_default(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

fn parse_rule(index: usize, item: &Item) -> BusinessRule {
    let implementation = labelled(&item.body, &["Implementation", "Business Intent"])
        .unwrap_or_else(|| lead(&item.body));

    BusinessRule::new(
        Some(format!("RULE_{}", index)),
        or_default(item.title.clone(), NO_DESCRIPTION),
        or_default(implementation, NO_IMPLEMENTATION),
    )
}

fn parse_validation(item: &Item) -> Validation {
    let rule = labelled(&item.body, &["Validation Constraints"]).unwrap_or_else(|| lead(&item.body));

    Validation {
        field: or_default(item.title.clone(), NO_FIELD),
        rule: or_default(rule, NO_RULE),
        error_handling: labelled(&item.body, &["Exceptional Handling Scenarios"]),
    }
}

fn parse_special_case(item: &Item) -> SpecialCase {
    let handling = labelled(&item.body, &["Business Intent"]).unwrap_or_else(|| lead(&item.body));

    SpecialCase {
        condition: or_default(item.title.clone(), NO_CONDITION),
        handling: or_default(handling, NO_HANDLING),
        notes: labelled(&item.body, &["Exceptional Handling Scenarios"]),
    }
}

fn parse_integration_point(item: &Item) -> IntegrationPoint {
    let description =
        labelled(&item.body, &["Business Intent"]).unwrap_or_else(|| lead(&item.body));
    let text = format!("{} {}", item.title, item.body).to_lowercase();

    // 明確標示的方向優先於關鍵字
    let stated = labelled(&item.body, &["Direction"]).and_then(|value| {
        value
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|word| !word.is_empty())
            .and_then(|word| word.parse::<Direction>().ok())
    });

    let direction = if let Some(direction) = stated {
        direction
    } else if text.contains("input") || text.contains("read") {
        Direction::Input
    } else if text.contains("output") || text.contains("write") {
        Direction::Output
    } else {
        Direction::Both
    };

    let integration_type = if text.contains("api") || text.contains("service") {
        IntegrationType::Api
    } else if text.contains("file") {
        IntegrationType::File
    } else {
        IntegrationType::Database
    };

    IntegrationPoint {
        name: or_default(item.title.clone(), NO_INTEGRATION_NAME),
        description: or_default(description, NO_DESCRIPTION),
        integration_type,
        direction,
    }
}
