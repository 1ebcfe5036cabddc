use crate::domain::model::{ProgramFile, ProgramInfo, ProgramType};
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::validation::has_extension;
use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_FILE_SIZE: usize = 100;
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".cob", ".cbl", ".cobol", ".cpy", ".txt"];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("static upload pattern"))
        .collect()
}

static DC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"PROTOCOL\s+MODE\s+IS\s+(IDMSDC|DCUF)",
        r#"CALL\s+"IDMS""#,
        r"MAP\s+SECTION",
        r"COPY\s+IDMS\s+SUBSCHEMA",
        r"##MAPBIND",
        r"TRANSFER\s+TO\s+PROGRAM",
        r"LINK\s+TO\s+PROGRAM",
        r"ACCEPT\s+TASK\s+CODE",
    ])
});

static DB_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"DATABASE\s+SECTION",
        r"INVOKE\s+SUBSCHEMA",
        r"DB-STATISTICS",
        r"RUN-UNIT",
        r"COPY\s+IDMS\s+SUBSCHEMA-CTRL",
        r"PROCEDURE\s+DIVISION\s+USING\s+SUBSCHEMA-NAMES",
    ])
});

static COBOL_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"IDENTIFICATION\s+DIVISION",
        r"PROCEDURE\s+DIVISION",
        r"PROGRAM-ID",
        r"DATA\s+DIVISION",
        r"WORKING-STORAGE\s+SECTION",
        r"ENVIRONMENT\s+DIVISION",
        r"COPY\s+IDMS",
        r"MOVE\s+",
        r"PERFORM\s+",
        r"IF\s+",
        r"END-IF",
        r"SECTION",
        r"DIVISION",
        r"COMPUTE",
        r"ACCEPT",
        r"DISPLAY",
        r"EXEC\s+SQL",
        r"CALL\s+",
        r"PIC\s+",
        r"PICTURE\s+",
        r"COBOL",
        r"IDMS",
    ])
});

static PROCEDURE_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)PROCEDURE\s+DIVISION.*?\.(.*?)(?:PROGRAM-END|\z)").expect("procedure pattern")
});
static SECTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([A-Z0-9-]+)\s+SECTION\s*\.").expect("section pattern"));
static PARAGRAPH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*([A-Z0-9-]+)[ \t]*\.[ \t]*$").expect("paragraph pattern")
});

// 單獨成行的 COBOL 動詞，不是段落名稱
const STATEMENT_WORDS: [&str; 7] = [
    "EXIT",
    "GOBACK",
    "CONTINUE",
    "END-IF",
    "END-PERFORM",
    "END-EVALUATE",
    "END-READ",
];

impl ProgramFile {
    /// Validates an uploaded program and decodes its content.
    pub fn from_bytes(name: &str, bytes: &[u8], extension_override: Option<&str>) -> Result<Self> {
        let name = apply_extension_override(name, extension_override);
        let size = bytes.len();

        tracing::debug!("Uploaded file: {}, size: {} bytes", name, size);

        if size < MIN_FILE_SIZE {
            return Err(AnalyzerError::UploadError {
                message: format!("File is too small (minimum: {} bytes)", MIN_FILE_SIZE),
            });
        }
        if size > MAX_FILE_SIZE {
            return Err(AnalyzerError::UploadError {
                message: format!(
                    "File is too large (maximum: {:.1} MB)",
                    MAX_FILE_SIZE as f64 / 1024.0 / 1024.0
                ),
            });
        }

        if !has_extension(&name, &SUPPORTED_EXTENSIONS) {
            tracing::warn!(
                "⚠️ {} does not have a usual COBOL extension ({}); checking content instead",
                name,
                SUPPORTED_EXTENSIONS.join(", ")
            );
        }

        let content = decode_program_bytes(bytes);

        if !has_idms_content(&content) {
            return Err(AnalyzerError::UploadError {
                message: "The file doesn't appear to contain valid COBOL/IDMS code".to_string(),
            });
        }

        let program_type = detect_program_type(&content);
        let line_count = content.lines().count();

        tracing::info!(
            "✅ Accepted {} ({} lines, detected as {} program)",
            name,
            line_count,
            program_type.label()
        );

        Ok(Self {
            name,
            content,
            program_type,
            size_bytes: size,
            line_count,
        })
    }
}

fn apply_extension_override(name: &str, extension_override: Option<&str>) -> String {
    match extension_override {
        Some(ext) if !ext.trim().is_empty() => {
            let stem = std::path::Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name);
            format!("{}.{}", stem, ext.trim().trim_start_matches('.'))
        }
        _ => name.to_string(),
    }
}

/// UTF-8 when possible, Latin-1 otherwise; binary-looking input goes straight to Latin-1.
pub fn decode_program_bytes(bytes: &[u8]) -> String {
    let probe = &bytes[..bytes.len().min(1024)];
    if probe.contains(&0) {
        tracing::warn!("⚠️ File appears to be binary, decoding as Latin-1");
        return decode_latin1(bytes);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::info!("File is not valid UTF-8, decoded using Latin-1");
            decode_latin1(bytes)
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn has_idms_content(content: &str) -> bool {
    let matches = COBOL_INDICATORS
        .iter()
        .filter(|pattern| pattern.is_match(content))
        .count();
    tracing::debug!("COBOL indicators found: {}", matches);
    matches >= 1
}

pub fn detect_program_type(content: &str) -> ProgramType {
    let dc_count = DC_PATTERNS.iter().filter(|p| p.is_match(content)).count();
    let db_count = DB_PATTERNS.iter().filter(|p| p.is_match(content)).count();

    if dc_count > db_count {
        ProgramType::Dc
    } else if db_count > dc_count {
        ProgramType::Db
    } else {
        let upper = content.to_uppercase();
        if upper.contains("SCREEN SECTION") || upper.contains("WORKING-STORAGE SECTION") {
            ProgramType::Dc
        } else {
            ProgramType::Db
        }
    }
}

/// Scrapes PROGRAM-ID, REMARKS/HISTORY comment blocks and procedure names.
pub fn extract_program_information(content: &str) -> ProgramInfo {
    let program_id = content
        .lines()
        .find(|line| line.contains("PROGRAM-ID."))
        .and_then(|line| line.split('.').nth(1))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    ProgramInfo {
        program_id,
        program_type: detect_program_type(content),
        remarks: comment_block(content, "*REMARKS.", Some("*HISTORY:")),
        history: comment_block(content, "*HISTORY:", None),
        line_count: content.lines().count(),
        sections: extract_sections(content),
    }
}

fn comment_block(content: &str, marker: &str, stop_marker: Option<&str>) -> Vec<String> {
    let mut items = Vec::new();
    let mut inside = false;

    for line in content.lines().map(str::trim) {
        if line.contains(marker) {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        if !line.starts_with('*') {
            inside = false;
            continue;
        }
        if stop_marker.is_some_and(|stop| line.contains(stop)) {
            inside = false;
            continue;
        }

        let item = line[1..].trim();
        if !item.is_empty() && !item.starts_with("--") {
            items.push(item.to_string());
        }
    }

    items
}

pub fn extract_sections(content: &str) -> Vec<String> {
    let Some(body) = PROCEDURE_BODY.captures(content).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let body = body.as_str();

    let sections = SECTION_NAME.captures_iter(body).map(|c| c[1].to_string());
    let paragraphs = PARAGRAPH_NAME
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .filter(|name| !STATEMENT_WORDS.contains(&name.to_uppercase().as_str()));

    let mut names: Vec<String> = Vec::new();
    for name in sections.chain(paragraphs) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
