use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8000;
pub const DEFAULT_SAMPLE_SIZE: usize = 5000;

static IDENTIFICATION_DIVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)IDENTIFICATION\s+DIVISION").expect("division pattern"));
static ENVIRONMENT_DIVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ENVIRONMENT\s+DIVISION").expect("division pattern"));
// 縮排行上的 `NAME SECTION.` 或 `NAME.`
static BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]+[A-Z0-9-]+(?:[ \t]+SECTION)?[ \t]*\.").expect("boundary pattern")
});

/// Splits program source into pieces small enough for one LLM request.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_SIZE)
    }
}

impl Chunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn chunk(&self, content: &str) -> Vec<String> {
        if content.len() <= self.max_chunk_size {
            return vec![content.to_string()];
        }

        let (preamble, body) = self.split_preamble(content);

        let mut chunks = Vec::new();
        let first_end = self.first_chunk_end(body);
        chunks.push(body[..first_end].to_string());
        self.push_rest(&body[first_end..], &mut chunks);

        // 過長的開頭註解排在最後
        if !preamble.is_empty() {
            tracing::debug!(
                "Moved {} byte preamble after the program body",
                preamble.len()
            );
            self.push_rest(preamble, &mut chunks);
        }

        tracing::debug!(
            "Split {} bytes into {} chunks (limit {})",
            content.len(),
            chunks.len(),
            self.max_chunk_size
        );
        chunks
    }

    fn push_rest(&self, mut remaining: &str, chunks: &mut Vec<String>) {
        while !remaining.is_empty() {
            let split = self.split_position(remaining);
            chunks.push(remaining[..split].to_string());
            remaining = &remaining[split..];
        }
    }

    /// Text before the IDENTIFICATION DIVISION line when it would push the
    /// division past the first chunk.
    fn split_preamble<'c>(&self, content: &'c str) -> (&'c str, &'c str) {
        let Some(id) = IDENTIFICATION_DIVISION.find(content) else {
            return ("", content);
        };
        if id.end() <= self.max_chunk_size {
            return ("", content);
        }

        let line_start = content[..id.start()].rfind('\n').map_or(0, |i| i + 1);
        let cut = if id.end() - line_start <= self.max_chunk_size {
            line_start
        } else {
            id.start()
        };
        content.split_at(cut)
    }

    /// IDENTIFICATION DIVISION 必須落在第一段
    fn first_chunk_end(&self, content: &str) -> usize {
        let limit = floor_char_boundary(content, self.max_chunk_size);
        let end = match (
            IDENTIFICATION_DIVISION.find(content),
            ENVIRONMENT_DIVISION.find(content),
        ) {
            (Some(id), Some(env)) if env.start() > id.start() => env.start().min(limit),
            _ => limit,
        };
        ensure_progress(content, end)
    }

    fn split_position(&self, remaining: &str) -> usize {
        if remaining.len() <= self.max_chunk_size {
            return remaining.len();
        }

        let window = &remaining[..floor_char_boundary(remaining, self.max_chunk_size * 2)];
        let boundary = BOUNDARY
            .find_iter(window)
            .map(|m| m.start())
            .filter(|&start| start > 0 && start <= self.max_chunk_size)
            .last();

        let split = boundary.unwrap_or_else(|| floor_char_boundary(remaining, self.max_chunk_size));
        ensure_progress(remaining, split)
    }
}

/// The first `sample_size` bytes of `content`, cut on a character boundary.
pub fn sample(content: &str, sample_size: usize) -> &str {
    &content[..floor_char_boundary(content, sample_size)]
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// 切點為 0 時至少前進一個字元
fn ensure_progress(text: &str, split: usize) -> usize {
    if split > 0 {
        return split;
    }
    text.char_indices()
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
