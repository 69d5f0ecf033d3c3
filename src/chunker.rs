//! Markdown-aware chunker.
//!
//! Splits a document into retrievable [`Chunk`]s. With `respect_headers` on,
//! the document is first cut into sections at ATX headings (`#` to `######`),
//! ignoring heading-looking lines inside fenced code blocks. A section that
//! fits the token budget becomes one chunk; a larger one is walked line by
//! line with a sliding window that never splits inside a fence, prefixes the
//! section heading to every later window, and seeds each new window with a
//! few trailing lines of the previous one.
//!
//! Chunking is pure and deterministic: the same text and path always give the
//! same line ranges, ids and hashes.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;

/// A contiguous run of lines cut from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub path: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub text: String,
    /// SHA-256 of `text` (already trimmed).
    pub hash: String,
}

impl Chunk {
    pub fn id(&self) -> String {
        chunk_id(&self.path, self.start_line, self.end_line)
    }
}

/// Deterministic chunk id: hex SHA-256 of `"path:start:end"`.
pub fn chunk_id(path: &str, start_line: usize, end_line: usize) -> String {
    sha256_hex(&format!("{path}:{start_line}:{end_line}"))
}

/// Hex SHA-256 of a string. Used for chunk and whole-file content hashes.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

// ── Token estimation ─────────────────────────────────────────────────────────

/// Character counts that feed the token estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TokenCount {
    cjk: usize,
    other: usize,
}

impl TokenCount {
    fn of(text: &str) -> Self {
        text.chars().fold(Self::default(), |mut acc, c| {
            if is_cjk(c) {
                acc.cjk += 1;
            } else {
                acc.other += 1;
            }
            acc
        })
    }

    /// `self`, a newline, then `next`.
    fn join(self, next: TokenCount) -> Self {
        Self {
            cjk: self.cjk + next.cjk,
            other: self.other + next.other + 1,
        }
    }

    /// `ceil(cjk / 1.5 + other / 4)` in integer arithmetic.
    fn tokens(self) -> usize {
        (8 * self.cjk + 3 * self.other + 11) / 12
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// Estimated token count: CJK ideographs at 1.5 characters per token,
/// everything else at 4.
pub fn estimate_tokens(text: &str) -> usize {
    TokenCount::of(text).tokens()
}

// ── Line classification ──────────────────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    (1..=6).contains(&hashes)
        && line[hashes..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace())
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

// ── Sections ─────────────────────────────────────────────────────────────────

struct Section<'a> {
    /// Index of the heading line, when the section has one.
    heading: Option<usize>,
    /// 0-based index of the first line.
    start: usize,
    lines: Vec<&'a str>,
}

fn split_sections<'a>(lines: &[&'a str], respect_headers: bool) -> Vec<Section<'a>> {
    if !respect_headers {
        return vec![Section {
            heading: None,
            start: 0,
            lines: lines.to_vec(),
        }];
    }

    let mut sections = Vec::new();
    let mut current = Section {
        heading: None,
        start: 0,
        lines: Vec::new(),
    };
    let mut in_fence = false;

    for (idx, line) in lines.iter().enumerate() {
        if !in_fence && is_heading(line) {
            let next = Section {
                heading: Some(idx),
                start: idx,
                lines: Vec::new(),
            };
            let done = std::mem::replace(&mut current, next);
            if !done.lines.is_empty() {
                sections.push(done);
            }
        }
        if is_fence(line) {
            in_fence = !in_fence;
        }
        current.lines.push(line);
    }
    if !current.lines.is_empty() {
        sections.push(current);
    }
    sections
}

// ── Sliding window ───────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct WindowLine<'a> {
    idx: usize,
    text: &'a str,
    count: TokenCount,
}

#[derive(Default)]
struct Window<'a> {
    lines: Vec<WindowLine<'a>>,
    count: TokenCount,
}

impl<'a> Window<'a> {
    fn from_lines(lines: Vec<WindowLine<'a>>) -> Self {
        let mut window = Window::default();
        for line in lines {
            window.push(line);
        }
        window
    }

    fn push(&mut self, line: WindowLine<'a>) {
        self.count = if self.lines.is_empty() {
            line.count
        } else {
            self.count.join(line.count)
        };
        self.lines.push(line);
    }

    fn first_idx(&self) -> Option<usize> {
        self.lines.first().map(|l| l.idx)
    }

    /// Count of the window with `line` appended.
    fn count_with(&self, line: TokenCount) -> TokenCount {
        if self.lines.is_empty() {
            line
        } else {
            self.count.join(line)
        }
    }

    /// Trailing whole lines worth at most `budget` tokens, stopping at fences
    /// so the next window never opens mid-block.
    fn tail(&self, budget: usize) -> Vec<WindowLine<'a>> {
        let mut carry = Vec::new();
        let mut total: Option<TokenCount> = None;
        for line in self.lines.iter().rev() {
            if is_fence(line.text) {
                break;
            }
            let next = match total {
                None => line.count,
                Some(t) => line.count.join(t),
            };
            if next.tokens() > budget {
                break;
            }
            total = Some(next);
            carry.push(*line);
        }
        carry.reverse();
        carry
    }
}

/// Chunk a markdown document. `path` is recorded on every chunk and feeds the
/// chunk id; pass the workspace-relative path.
pub fn chunk_markdown(text: &str, path: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let mut chunks = Vec::new();
    for section in split_sections(&lines, config.respect_headers) {
        chunk_section(&section, path, config, &mut chunks);
    }
    chunks
}

fn chunk_section(section: &Section<'_>, path: &str, config: &ChunkingConfig, out: &mut Vec<Chunk>) {
    let whole = section.lines.join("\n");
    if whole.trim().is_empty() {
        return;
    }

    if estimate_tokens(&whole) <= config.max_tokens {
        let entries: Vec<WindowLine<'_>> = section
            .lines
            .iter()
            .enumerate()
            .map(|(i, text)| WindowLine {
                idx: section.start + i,
                text,
                count: TokenCount::default(),
            })
            .collect();
        if let Some(chunk) = build_chunk(path, None, &entries) {
            out.push(chunk);
        }
        return;
    }

    let heading = section.heading.map(|idx| {
        let text = format!("{}\n\n", section.lines[idx - section.start]);
        HeadingPrefix {
            idx,
            count: TokenCount::of(&text),
            text,
        }
    });
    // Every window that does not open on the heading line carries it as a prefix.
    let prefix_for = |first: usize| heading.as_ref().filter(|h| h.idx != first);

    let split_at = config.max_tokens.saturating_sub(config.overlap_tokens);
    let mut window = Window::default();
    let mut in_fence = false;

    for (i, text) in section.lines.iter().enumerate() {
        let line = WindowLine {
            idx: section.start + i,
            text,
            count: TokenCount::of(text),
        };

        if let (Some(first), false) = (window.first_idx(), in_fence) {
            let prefix = prefix_for(first);
            if prefixed_tokens(prefix, window.count_with(line.count)) > split_at {
                if let Some(chunk) = build_chunk(path, prefix, &window.lines) {
                    out.push(chunk);
                }

                let mut carry = window.tail(config.overlap_tokens);
                while let Some(head) = carry.first() {
                    let seeded = Window::from_lines(carry.clone());
                    let tokens = prefixed_tokens(prefix_for(head.idx), seeded.count_with(line.count));
                    if tokens <= config.max_tokens {
                        break;
                    }
                    carry.remove(0);
                }
                window = Window::from_lines(carry);
            }
        }

        window.push(line);
        if is_fence(text) {
            in_fence = !in_fence;
        }
    }

    if let Some(first) = window.first_idx() {
        if let Some(chunk) = build_chunk(path, prefix_for(first), &window.lines) {
            out.push(chunk);
        }
    }
}

struct HeadingPrefix {
    idx: usize,
    /// Heading line followed by a blank line.
    text: String,
    count: TokenCount,
}

fn prefixed_tokens(prefix: Option<&HeadingPrefix>, body: TokenCount) -> usize {
    match prefix {
        Some(p) => TokenCount {
            cjk: p.count.cjk + body.cjk,
            other: p.count.other + body.other,
        }
        .tokens(),
        None => body.tokens(),
    }
}

/// Build a chunk from window lines, dropping blank lines at either end so the
/// line range covers only content. Returns `None` for an all-blank window.
fn build_chunk(
    path: &str,
    prefix: Option<&HeadingPrefix>,
    lines: &[WindowLine<'_>],
) -> Option<Chunk> {
    let first = lines.iter().position(|l| !is_blank(l.text))?;
    let last = lines.iter().rposition(|l| !is_blank(l.text))?;
    let body = &lines[first..=last];

    let mut text = prefix.map(|p| p.text.clone()).unwrap_or_default();
    text.push_str(
        &body
            .iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n"),
    );
    let text = text.trim().to_string();

    Some(Chunk {
        path: path.to_string(),
        start_line: body[0].idx + 1,
        end_line: body[body.len() - 1].idx + 1,
        hash: sha256_hex(&text),
        text,
    })
}
