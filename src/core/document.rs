use crate::domain::model::{BusinessLogic, ProgramInfo, TestCase, TestScript};
use crate::utils::error::{AnalyzerError, Result};
use docx_rs::{
    AlignmentType, BreakType, Docx, Paragraph, Run, RunFonts, Style, StyleType, Table, TableCell,
    TableRow,
};
use std::io::Cursor;

const DARK_BLUE: &str = "003366";
const CODE_FONT: &str = "Courier New";

pub fn business_logic_file_name(program_name: &str) -> String {
    format!("{}_Business_Logic.docx", program_name)
}

pub fn validated_logic_file_name(program_name: &str) -> String {
    format!("{}_Validated_Business_Logic.docx", program_name)
}

pub fn test_script_file_name(program_name: &str) -> String {
    format!("{}_Test_Script.docx", program_name)
}

pub fn raw_analysis_file_name(program_name: &str) -> String {
    format!("{}_Raw_Analysis.docx", program_name)
}

/// Thin consuming wrapper over `docx_rs::Docx` with the heading styles preset.
struct WordDocument {
    docx: Docx,
}

impl WordDocument {
    fn new() -> Self {
        let docx = (1..=4).fold(Docx::new(), |docx, level| docx.add_style(heading_style(level)));
        Self { docx }
    }

    fn add(mut self, paragraph: Paragraph) -> Self {
        self.docx = self.docx.add_paragraph(paragraph);
        self
    }

    fn title(self, text: &str) -> Self {
        self.add(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(text).bold().size(48).color(DARK_BLUE)),
        )
    }

    fn heading(self, level: usize, text: &str) -> Self {
        self.add(
            Paragraph::new()
                .style(&format!("Heading{}", level))
                .add_run(Run::new().add_text(text)),
        )
    }

    fn paragraph(self, text: &str) -> Self {
        self.add(Paragraph::new().add_run(Run::new().add_text(text)))
    }

    fn bullet(self, text: &str) -> Self {
        self.paragraph(&format!("• {}", text))
    }

    fn page_break(self) -> Self {
        self.add(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)))
    }

    /// 第一列為粗體標題列
    fn table(mut self, rows: Vec<Vec<Vec<String>>>, header: bool) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| {
                TableRow::new(
                    cells
                        .into_iter()
                        .map(|lines| {
                            lines.iter().fold(TableCell::new(), |cell, line| {
                                let run = Run::new().add_text(line);
                                let run = if header && i == 0 { run.bold() } else { run };
                                cell.add_paragraph(Paragraph::new().add_run(run))
                            })
                        })
                        .collect(),
                )
            })
            .collect();
        self.docx = self.docx.add_table(Table::new(rows));
        self
    }

    fn key_value_table(self, rows: &[(&str, String)]) -> Self {
        let rows = rows
            .iter()
            .map(|(label, value)| vec![vec![label.to_string()], vec![value.clone()]])
            .collect();
        self.table(rows, false)
    }

    fn into_bytes(self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.docx
            .build()
            .pack(&mut buffer)
            .map_err(|e| AnalyzerError::DocumentError {
                message: e.to_string(),
            })?;
        Ok(buffer.into_inner())
    }
}

fn heading_style(level: usize) -> Style {
    let size = match level {
        1 => 32,
        2 => 28,
        3 => 24,
        _ => 22,
    };
    let style = Style::new(format!("Heading{}", level), StyleType::Paragraph)
        .name(format!("Heading {}", level))
        .size(size)
        .bold();
    if level <= 3 {
        style.color(DARK_BLUE)
    } else {
        style.italic()
    }
}

pub fn render_business_logic(logic: &BusinessLogic) -> Result<Vec<u8>> {
    let mut doc = WordDocument::new()
        .title(&format!("{} Business Logic", logic.program_name))
        .page_break()
        .heading(1, "Program Information")
        .key_value_table(&[
            ("Program Name", logic.program_name.clone()),
            ("Program Type", logic.program_type.to_string()),
            ("Program Purpose", logic.program_purpose.clone()),
        ]);

    doc = doc.heading(1, "Core Business Rules");
    if logic.core_rules.is_empty() {
        doc = doc.paragraph("No core business rules identified.");
    }
    for rule in &logic.core_rules {
        doc = doc
            .heading(2, &rule.rule_id)
            .paragraph(&format!("Description: {}", rule.description))
            .paragraph(&format!("Implementation: {}", rule.implementation));
    }

    doc = doc.heading(1, "Data Validation Rules");
    if logic.validations.is_empty() {
        doc = doc.paragraph("No validation rules identified.");
    } else {
        let mut rows = vec![vec![
            vec!["Field".to_string()],
            vec!["Validation Rule".to_string()],
            vec!["Error Handling".to_string()],
        ]];
        rows.extend(logic.validations.iter().map(|v| {
            vec![
                vec![v.field.clone()],
                vec![v.rule.clone()],
                vec![v.error_handling.clone().unwrap_or_else(|| "N/A".to_string())],
            ]
        }));
        doc = doc.table(rows, true);
    }

    doc = doc.heading(1, "Special Processing Rules");
    if logic.special_cases.is_empty() {
        doc = doc.paragraph("No special cases identified.");
    }
    for case in &logic.special_cases {
        doc = doc
            .heading(2, &case.condition)
            .paragraph(&format!("Handling: {}", case.handling));
        if let Some(notes) = &case.notes {
            doc = doc.paragraph(&format!("Notes: {}", notes));
        }
    }

    doc = doc.heading(1, "Integration Points");
    if logic.integration_points.is_empty() {
        doc = doc.paragraph("No integration points identified.");
    }
    for point in &logic.integration_points {
        doc = doc.heading(2, &point.name).key_value_table(&[
            ("Type", point.integration_type.to_string()),
            ("Direction", point.direction.to_string()),
            ("Description", point.description.clone()),
        ]);
    }

    if let Some(notes) = logic.additional_notes.as_deref().filter(|n| !n.is_empty()) {
        doc = doc.heading(1, "Additional Notes");
        for line in notes.lines() {
            doc = doc.paragraph(line);
        }
    }

    doc.into_bytes()
}

pub fn render_test_script(script: &TestScript) -> Result<Vec<u8>> {
    let mut doc = WordDocument::new()
        .title(&format!("Test Script for {}", script.program_name))
        .page_break()
        .heading(1, "Test Script Overview")
        .paragraph(&format!("Program: {}", script.program_name))
        .paragraph(&format!("Total Test Cases: {}", script.test_cases.len()));

    for case in &script.test_cases {
        doc = test_case_section(doc.page_break(), case);
    }

    doc.into_bytes()
}

fn test_case_section(doc: WordDocument, case: &TestCase) -> WordDocument {
    let mut doc = doc
        .heading(2, &format!("Test Case: {}", case.test_id))
        .heading(3, &case.title)
        .paragraph(&format!("Description: {}", case.description))
        .heading(4, "Prerequisites");

    if case.prerequisites.is_empty() {
        doc = doc.paragraph("None");
    }
    for prerequisite in &case.prerequisites {
        doc = doc.bullet(prerequisite);
    }

    doc = doc.heading(4, "Test Data");
    if case.test_data.is_empty() {
        doc = doc.paragraph("None");
    }
    for (key, value) in &case.test_data {
        doc = doc.paragraph(&format!("{}: {}", key, value));
    }

    doc = doc.heading(4, "Steps");
    for (i, step) in case.steps.iter().enumerate() {
        doc = doc.paragraph(&format!("{}. {}", i + 1, step));
    }

    doc = doc.heading(4, "Expected Results");
    for result in &case.expected_results {
        doc = doc.bullet(result);
    }

    if !case.related_rules.is_empty() {
        doc = doc
            .heading(4, "Related Business Rules")
            .paragraph(&case.related_rules.join(", "));
    }

    doc
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
    Missing,
}

impl MetadataValue {
    fn lines(&self) -> Vec<String> {
        match self {
            MetadataValue::Text(text) => vec![text.clone()],
            MetadataValue::List(items) if !items.is_empty() => {
                items.iter().map(|item| format!("• {}", item)).collect()
            }
            _ => vec!["None".to_string()],
        }
    }
}

/// `program_id` → `Program Id`
pub fn format_metadata_key(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn program_metadata(info: &ProgramInfo) -> Vec<(String, MetadataValue)> {
    vec![
        (
            "program_id".to_string(),
            info.program_id
                .clone()
                .map_or(MetadataValue::Missing, MetadataValue::Text),
        ),
        (
            "program_type".to_string(),
            MetadataValue::Text(info.program_type.label().to_string()),
        ),
        (
            "line_count".to_string(),
            MetadataValue::Text(info.line_count.to_string()),
        ),
        ("remarks".to_string(), MetadataValue::List(info.remarks.clone())),
        ("history".to_string(), MetadataValue::List(info.history.clone())),
        ("sections".to_string(), MetadataValue::List(info.sections.clone())),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStyle {
    Plain,
    Bold,
    Italic,
    Code,
}

/// Splits a markdown line into `**bold**`, `*italic*` and `` `code` `` spans.
pub fn inline_spans(line: &str) -> Vec<(SpanStyle, &str)> {
    let mut spans = Vec::new();
    let mut rest = line;

    while !rest.is_empty() {
        let delimited = [("**", SpanStyle::Bold), ("*", SpanStyle::Italic), ("`", SpanStyle::Code)]
            .iter()
            .find_map(|(marker, style)| {
                let after = rest.strip_prefix(marker)?;
                // 空內容或未閉合的標記保留原文
                let end = after.find(marker).filter(|&end| end > 0)?;
                Some((*style, &after[..end], &after[end + marker.len()..]))
            });

        if let Some((style, text, remaining)) = delimited {
            spans.push((style, text));
            rest = remaining;
            continue;
        }

        let next = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| matches!(c, '*' | '`'))
            .map_or(rest.len(), |(i, _)| i);
        spans.push((SpanStyle::Plain, &rest[..next]));
        rest = &rest[next..];
    }

    spans
}

fn styled_run(style: SpanStyle, text: &str) -> Run {
    let run = Run::new().add_text(text);
    match style {
        SpanStyle::Plain => run,
        SpanStyle::Bold => run.bold(),
        SpanStyle::Italic => run.italic(),
        SpanStyle::Code => run.fonts(RunFonts::new().ascii(CODE_FONT)),
    }
}

fn code_block(lines: &[String]) -> Paragraph {
    lines
        .iter()
        .enumerate()
        .fold(Paragraph::new(), |paragraph, (i, line)| {
            let run = Run::new()
                .fonts(RunFonts::new().ascii(CODE_FONT))
                .size(18)
                .add_text(line);
            let run = if i + 1 < lines.len() {
                run.add_break(BreakType::TextWrapping)
            } else {
                run
            };
            paragraph.add_run(run)
        })
}

fn numbered_line(line: &str) -> Option<(&str, &str)> {
    let (number, text) = line.split_once(". ")?;
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then_some((number, text))
}

fn convert_markdown(mut doc: WordDocument, markdown: &str) -> WordDocument {
    let mut in_code = false;
    let mut code_lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for raw in markdown.lines() {
        let line = raw.trim_end();

        if line.starts_with("```") {
            if in_code && !code_lines.is_empty() {
                doc = doc.add(code_block(&code_lines));
                code_lines.clear();
            }
            in_code = !in_code;
            continue;
        }
        if in_code {
            code_lines.push(line.to_string());
            continue;
        }

        let heading = [("#### ", 4), ("### ", 3), ("## ", 2), ("# ", 1)]
            .iter()
            .find_map(|(prefix, level)| line.strip_prefix(prefix).map(|text| (*level, text)));

        doc = if let Some((level, text)) = heading {
            doc.heading(level, text)
        } else if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            doc.add(inline_paragraph(&format!("• {}", text)))
        } else if let Some((number, text)) = numbered_line(line) {
            doc.add(inline_paragraph(&format!("{}. {}", number, text)))
        } else if matches!(line, "---" | "***" | "___") {
            doc.paragraph(&"_".repeat(50))
        } else if line.len() > 4 && line.starts_with("**") && line.ends_with("**") {
            doc.add(Paragraph::new().add_run(styled_run(SpanStyle::Bold, &line[2..line.len() - 2])))
        } else if line.len() > 2 && line.starts_with('*') && line.ends_with('*') {
            doc.add(Paragraph::new().add_run(styled_run(SpanStyle::Italic, &line[1..line.len() - 1])))
        } else if line.trim().is_empty() {
            if previous_blank {
                doc
            } else {
                doc.add(Paragraph::new())
            }
        } else {
            doc.add(inline_paragraph(line))
        };

        previous_blank = line.trim().is_empty();
    }

    // 未關閉的程式碼區塊照樣輸出
    if !code_lines.is_empty() {
        doc = doc.add(code_block(&code_lines));
    }

    doc
}

fn inline_paragraph(line: &str) -> Paragraph {
    inline_spans(line)
        .into_iter()
        .fold(Paragraph::new(), |paragraph, (style, text)| {
            paragraph.add_run(styled_run(style, text))
        })
}

/// Renders markdown (such as a raw model answer) behind a dated title page.
pub fn render_markdown_report(
    markdown: &str,
    title: &str,
    metadata: Option<&[(String, MetadataValue)]>,
) -> Result<Vec<u8>> {
    let generated = chrono::Local::now().format("%B %d, %Y").to_string();

    let mut doc = WordDocument::new()
        .title(title)
        .add(
            Paragraph::new().align(AlignmentType::Center).add_run(
                Run::new()
                    .add_text(format!("Generated on: {}", generated))
                    .size(24)
                    .italic(),
            ),
        )
        .add(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text("_".repeat(40)).size(32)),
        )
        .add(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text("IDMS Program Analysis").size(24)),
        )
        .page_break();

    if let Some(metadata) = metadata {
        let mut rows = vec![vec![vec!["Attribute".to_string()], vec!["Value".to_string()]]];
        rows.extend(
            metadata
                .iter()
                .map(|(key, value)| vec![vec![format_metadata_key(key)], value.lines()]),
        );
        doc = doc.heading(1, "Program Information").table(rows, true);
    }

    convert_markdown(doc, markdown).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        BusinessRule, Direction, IntegrationPoint, IntegrationType, ProgramType, Validation,
    };
    use std::io::Read;

    fn document_xml(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut file = archive.by_name("word/document.xml").unwrap();
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_file_names() {
        assert_eq!(business_logic_file_name("X800DN"), "X800DN_Business_Logic.docx");
        assert_eq!(
            validated_logic_file_name("X800DN"),
            "X800DN_Validated_Business_Logic.docx"
        );
        assert_eq!(test_script_file_name("X800DN"), "X800DN_Test_Script.docx");
        assert_eq!(raw_analysis_file_name("X800DN"), "X800DN_Raw_Analysis.docx");
    }

    #[test]
    fn test_business_logic_document_sections() {
        let mut logic = BusinessLogic::new("X800DN", ProgramType::Dc, "Customer inquiry");
        logic.core_rules.push(BusinessRule::new(
            Some("RULE_1".to_string()),
            "Customer Lookup",
            "OBTAIN CALC CUSTOMER",
        ));
        logic.validations.push(Validation {
            field: "CUSTOMER-ID".to_string(),
            rule: "Numeric".to_string(),
            error_handling: None,
        });
        logic.integration_points.push(IntegrationPoint {
            name: "CUSTOMER Record".to_string(),
            description: "Customer master".to_string(),
            integration_type: IntegrationType::Database,
            direction: Direction::Input,
        });

        let xml = document_xml(&render_business_logic(&logic).unwrap());

        assert!(xml.contains("X800DN Business Logic"));
        assert!(xml.contains("Program Information"));
        assert!(xml.contains("Description: Customer Lookup"));
        assert!(xml.contains("Implementation: OBTAIN CALC CUSTOMER"));
        assert!(xml.contains("Validation Rule"));
        assert!(xml.contains("N/A"));
        assert!(xml.contains("No special cases identified."));
        assert!(xml.contains("CUSTOMER Record"));
        assert!(!xml.contains("Additional Notes"));
    }

    #[test]
    fn test_test_script_document() {
        let mut case = TestCase::titled("X800DN-TC-001", "Valid lookup");
        case.steps = vec!["Enter id".to_string(), "Press ENTER".to_string()];
        case.expected_results = vec!["Customer shown".to_string()];
        case.related_rules = vec!["RULE_1".to_string(), "RULE_2".to_string()];
        let script = TestScript {
            program_name: "X800DN".to_string(),
            test_cases: vec![case],
        };

        let xml = document_xml(&render_test_script(&script).unwrap());

        assert!(xml.contains("Test Script for X800DN"));
        assert!(xml.contains("Total Test Cases: 1"));
        assert!(xml.contains("Test Case: X800DN-TC-001"));
        assert!(xml.contains("2. Press ENTER"));
        assert!(xml.contains("• Customer shown"));
        assert!(xml.contains("RULE_1, RULE_2"));
    }

    #[test]
    fn test_markdown_report_with_metadata() {
        let metadata = vec![
            ("program_id".to_string(), MetadataValue::Text("X800DN".to_string())),
            ("remarks".to_string(), MetadataValue::List(vec!["INQUIRY".to_string()])),
            ("history".to_string(), MetadataValue::List(Vec::new())),
        ];
        let markdown = "# Summary\nThe program uses **OBTAIN** and `MAP OUT`.\n- first point\n```\nMOVE A TO B.\n```\n";

        let xml = document_xml(
            &render_markdown_report(markdown, "X800DN Raw Analysis", Some(&metadata)).unwrap(),
        );

        assert!(xml.contains("X800DN Raw Analysis"));
        assert!(xml.contains("Generated on: "));
        assert!(xml.contains("Program Id"));
        assert!(xml.contains("• INQUIRY"));
        assert!(xml.contains("None"));
        assert!(xml.contains("Summary"));
        assert!(xml.contains("OBTAIN"));
        assert!(xml.contains("• first point"));
        assert!(xml.contains("MOVE A TO B."));
        assert!(xml.contains(CODE_FONT));
    }

    #[test]
    fn test_inline_spans() {
        assert_eq!(
            inline_spans("a **b** *c* `d` e"),
            vec![
                (SpanStyle::Plain, "a "),
                (SpanStyle::Bold, "b"),
                (SpanStyle::Plain, " "),
                (SpanStyle::Italic, "c"),
                (SpanStyle::Plain, " "),
                (SpanStyle::Code, "d"),
                (SpanStyle::Plain, " e"),
            ]
        );
        assert_eq!(inline_spans("5 * 3"), vec![(SpanStyle::Plain, "5 "), (SpanStyle::Plain, "* 3")]);

        let unclosed = inline_spans("**Total: 15 items");
        assert!(unclosed.iter().all(|(_, text)| !text.is_empty()));
        assert_eq!(unclosed.iter().map(|(_, text)| *text).collect::<String>(), "**Total: 15 items");
        assert!(unclosed.iter().all(|(style, _)| *style == SpanStyle::Plain));
    }

    #[test]
    fn test_format_metadata_key() {
        assert_eq!(format_metadata_key("program_id"), "Program Id");
        assert_eq!(format_metadata_key("line_count"), "Line Count");
    }
}
