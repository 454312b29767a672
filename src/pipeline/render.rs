//! Report rendering: lay out a [`Report`] as a paginated A4 PDF with lopdf.
//!
//! Layout happens in two passes. The first turns the report into a flat
//! list of blocks (one per output line or rule) with fonts, sizes and
//! vertical gaps already decided. The second assigns blocks to pages, keeping
//! headings with the line that follows them, and only then writes the
//! content streams, because the "Page N of M" footer needs the final count.
//!
//! Fonts are the standard Type1 Helvetica family with `WinAnsiEncoding`, so
//! nothing is embedded and any viewer can open the file. Characters outside
//! WinAnsi are mapped to close ASCII equivalents or `?`.

use crate::config::OutputFormat;
use crate::error::ReviewError;
use crate::output::Report;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
/// 2 cm.
pub const MARGIN: f32 = 56.69;

const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_SPACE: f32 = 18.0;
const LEADING: f32 = 1.35;

const TITLE_SIZE: f32 = 18.0;
const SUBTITLE_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;
const SMALL_SIZE: f32 = 8.5;
const FOOTER_SIZE: f32 = 8.0;

const LABEL_WIDTH: f32 = 120.0;
const BULLET_INDENT: f32 = 12.0;
const NESTED_INDENT: f32 = 14.0;

const HEADING_GAP: f32 = 14.0;
const PARAGRAPH_GAP: f32 = 6.0;

const TEXT_COLOR: Rgb = Rgb(0.0, 0.0, 0.0);
const HEADING_COLOR: Rgb = Rgb(0.17, 0.24, 0.31);
const MUTED_COLOR: Rgb = Rgb(0.4, 0.4, 0.4);

/// Produce the report bytes in the requested format.
pub fn render_report(report: &Report, format: OutputFormat) -> Result<Vec<u8>, ReviewError> {
    match format {
        OutputFormat::Pdf => render_pdf(report),
        OutputFormat::Markdown => Ok(report.to_markdown().into_bytes()),
        OutputFormat::Json => {
            serde_json::to_vec_pretty(report).map_err(|e| ReviewError::RenderFailed {
                detail: format!("cannot serialise report: {e}"),
            })
        }
    }
}

/// Render the report as a PDF document.
pub fn render_pdf(report: &Report) -> Result<Vec<u8>, ReviewError> {
    let blocks = layout(report);
    let pages = paginate(&blocks);
    let total = pages.len();
    debug!("Report layout: {} blocks on {} pages", blocks.len(), total);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |base: &str| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base.to_string(),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let oblique_id = doc.add_object(font("Helvetica-Oblique"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource() => regular_id,
            Font::Bold.resource() => bold_id,
            Font::Oblique.resource() => oblique_id,
        },
    });

    let mut kids = Vec::with_capacity(total);
    for (index, placed) in pages.iter().enumerate() {
        let mut ops = Vec::new();
        for p in placed {
            p.block.emit(p.baseline, &mut ops);
        }
        emit_footer(index + 1, total, &mut ops);

        let encoded = Content { operations: ops }
            .encode()
            .map_err(|e| ReviewError::RenderFailed {
                detail: format!("cannot encode page {}: {e}", index + 1),
            })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(total as i64),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });

    let created = report
        .metadata()
        .generated_at
        .format("D:%Y%m%d%H%M%S")
        .to_string();
    let info_id = doc.add_object(dictionary! {
        "Title" => pdf_string(report.title()),
        "Subject" => pdf_string(report.metadata().review_type.label()),
        "Producer" => pdf_string(concat!("archopinion ", env!("CARGO_PKG_VERSION"))),
        "Creator" => pdf_string(&report.metadata().model),
        "CreationDate" => Object::String(created.into_bytes(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| ReviewError::RenderFailed {
        detail: format!("cannot serialise PDF: {e}"),
    })?;
    Ok(buf)
}

// ── Layout model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgb(f32, f32, f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }

    /// Width of `text` in points at `size`.
    fn width(self, text: &str, size: f32) -> f32 {
        let units: u32 = to_win_ansi(text).iter().map(|&b| glyph_width(b) as u32).sum();
        let scale = match self {
            Font::Bold => 1.06,
            _ => 1.0,
        };
        units as f32 * size * scale / 1000.0
    }
}

/// A piece of text at a horizontal offset from the block's left edge.
#[derive(Debug, Clone)]
struct Run {
    font: Font,
    dx: f32,
    text: String,
}

#[derive(Debug, Clone)]
enum Block {
    Text {
        runs: Vec<Run>,
        x: f32,
        size: f32,
        color: Rgb,
        gap_before: f32,
        keep_with_next: bool,
    },
    Rule {
        gap_before: f32,
    },
}

impl Block {
    fn line(font: Font, x: f32, size: f32, text: impl Into<String>) -> Self {
        Block::Text {
            runs: vec![Run {
                font,
                dx: 0.0,
                text: text.into(),
            }],
            x,
            size,
            color: TEXT_COLOR,
            gap_before: 0.0,
            keep_with_next: false,
        }
    }

    fn gap(mut self, gap: f32) -> Self {
        match self {
            Block::Text {
                ref mut gap_before, ..
            }
            | Block::Rule {
                ref mut gap_before,
            } => *gap_before = gap,
        }
        self
    }

    fn color(mut self, rgb: Rgb) -> Self {
        if let Block::Text { ref mut color, .. } = self {
            *color = rgb;
        }
        self
    }

    fn keep(mut self) -> Self {
        if let Block::Text {
            ref mut keep_with_next,
            ..
        } = self
        {
            *keep_with_next = true;
        }
        self
    }

    fn height(&self) -> f32 {
        match self {
            Block::Text { size, .. } => size * LEADING,
            Block::Rule { .. } => 6.0,
        }
    }

    fn gap_before(&self) -> f32 {
        match self {
            Block::Text { gap_before, .. } | Block::Rule { gap_before } => *gap_before,
        }
    }

    fn keeps_with_next(&self) -> bool {
        matches!(
            self,
            Block::Text {
                keep_with_next: true,
                ..
            }
        )
    }

    /// Distance from the bottom of the block's slot to its baseline.
    fn descent(&self) -> f32 {
        match self {
            Block::Text { size, .. } => size * 0.3,
            Block::Rule { .. } => 3.0,
        }
    }

    fn emit(&self, baseline: f32, ops: &mut Vec<Operation>) {
        match self {
            Block::Text {
                runs,
                x,
                size,
                color,
                ..
            } => {
                ops.push(fill_color(*color));
                for run in runs.iter().filter(|r| !r.text.is_empty()) {
                    emit_text(run.font, *size, x + run.dx, baseline, &run.text, ops);
                }
            }
            Block::Rule { .. } => {
                ops.push(Operation::new(
                    "RG",
                    vec![Object::Real(0.75), Object::Real(0.75), Object::Real(0.75)],
                ));
                ops.push(Operation::new("w", vec![Object::Real(0.5)]));
                ops.push(Operation::new(
                    "m",
                    vec![Object::Real(MARGIN), Object::Real(baseline)],
                ));
                ops.push(Operation::new(
                    "l",
                    vec![Object::Real(PAGE_WIDTH - MARGIN), Object::Real(baseline)],
                ));
                ops.push(Operation::new("S", vec![]));
            }
        }
    }
}

struct Placed<'a> {
    block: &'a Block,
    baseline: f32,
}

// ── Pass 1: report → blocks ─────────────────────────────────────────────────

fn layout(report: &Report) -> Vec<Block> {
    let mut blocks = Vec::new();

    for (i, line) in wrap(report.title(), Font::Bold, TITLE_SIZE, CONTENT_WIDTH)
        .into_iter()
        .enumerate()
    {
        blocks.push(
            Block::line(Font::Bold, MARGIN, TITLE_SIZE, line)
                .color(HEADING_COLOR)
                .gap(if i == 0 { 0.0 } else { 2.0 }),
        );
    }
    blocks.push(
        Block::line(
            Font::Oblique,
            MARGIN,
            SUBTITLE_SIZE,
            format!("{} review", report.metadata().review_type.label()),
        )
        .color(MUTED_COLOR)
        .gap(4.0),
    );
    blocks.push(Block::Rule { gap_before: 6.0 });

    for (label, value) in report.header_rows() {
        let lines = wrap(&value, Font::Regular, BODY_SIZE, CONTENT_WIDTH - LABEL_WIDTH);
        for (i, line) in lines.into_iter().enumerate() {
            let mut runs = Vec::with_capacity(2);
            if i == 0 {
                runs.push(Run {
                    font: Font::Bold,
                    dx: 0.0,
                    text: format!("{label}:"),
                });
            }
            runs.push(Run {
                font: Font::Regular,
                dx: LABEL_WIDTH,
                text: line,
            });
            blocks.push(Block::Text {
                runs,
                x: MARGIN,
                size: BODY_SIZE,
                color: TEXT_COLOR,
                gap_before: if i == 0 { 2.0 } else { 0.0 },
                keep_with_next: false,
            });
        }
    }
    blocks.push(Block::Rule { gap_before: 6.0 });

    for section in report.sections() {
        let heading = wrap(&section.title, Font::Bold, HEADING_SIZE, CONTENT_WIDTH);
        for (i, line) in heading.into_iter().enumerate() {
            blocks.push(
                Block::line(Font::Bold, MARGIN, HEADING_SIZE, line)
                    .color(HEADING_COLOR)
                    .gap(if i == 0 { HEADING_GAP } else { 0.0 })
                    .keep(),
            );
        }
        body_blocks(&section.body, &mut blocks);
    }

    if let Some(disclaimer) = report.disclaimer() {
        blocks.push(Block::Rule { gap_before: 18.0 });
        blocks.push(
            Block::line(Font::Bold, MARGIN, SMALL_SIZE, "Disclaimer")
                .color(MUTED_COLOR)
                .gap(2.0)
                .keep(),
        );
        for line in wrap(disclaimer, Font::Oblique, SMALL_SIZE, CONTENT_WIDTH) {
            blocks.push(Block::line(Font::Oblique, MARGIN, SMALL_SIZE, line).color(MUTED_COLOR));
        }
    }

    blocks
}

static RE_BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").expect("bold regex is valid"));
static RE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("code regex is valid"));
static RE_SUBHEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s{0,3}(?:#{1,6}\s+(.+?)(?:\s+#+)?|\*\*([^*]+?)\*\*:?)\s*$")
        .expect("subheading regex is valid")
});
static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*+•]\s+(.*)$").expect("bullet regex is valid"));
static RE_NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(\d+[.)]|[a-z][.)])\s+(.*)$").expect("numbered regex is valid"));

/// Drop inline Markdown markers the fonts cannot express.
fn strip_inline(text: &str) -> String {
    let s = RE_BOLD.replace_all(text, |caps: &regex::Captures<'_>| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str())
            .to_string()
    });
    RE_CODE.replace_all(&s, "$1").into_owned()
}

fn is_table_separator(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// `| a | b |` → `a  |  b`.
fn flatten_table_row(line: &str) -> Option<String> {
    let t = line.trim();
    if !(t.starts_with('|') && t.ends_with('|') && t.len() > 2) {
        return None;
    }
    let cells: Vec<&str> = t[1..t.len() - 1].split('|').map(str::trim).collect();
    Some(cells.join("  |  "))
}

fn body_blocks(body: &str, blocks: &mut Vec<Block>) {
    let mut gap = 4.0;
    for raw in body.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            gap = PARAGRAPH_GAP;
            continue;
        }
        if is_table_separator(line) {
            continue;
        }

        if let Some(caps) = RE_SUBHEADING.captures(line) {
            let title = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or(line, |m| m.as_str());
            for l in wrap(&strip_inline(title), Font::Bold, BODY_SIZE, CONTENT_WIDTH) {
                blocks.push(
                    Block::line(Font::Bold, MARGIN, BODY_SIZE, l)
                        .gap(gap.max(PARAGRAPH_GAP))
                        .keep(),
                );
                gap = 0.0;
            }
            continue;
        }

        let (marker, depth, text) = if let Some(caps) = RE_BULLET.captures(line) {
            (Some("•".to_string()), caps[1].len() / 2, caps[2].to_string())
        } else if let Some(caps) = RE_NUMBERED.captures(line) {
            (Some(caps[2].to_string()), caps[1].len() / 2, caps[3].to_string())
        } else if let Some(row) = flatten_table_row(line) {
            (None, 0, row)
        } else {
            (None, 0, line.trim().to_string())
        };

        let text = strip_inline(&text);
        let x = MARGIN + depth as f32 * NESTED_INDENT;
        match marker {
            Some(m) => {
                let width = CONTENT_WIDTH - (x - MARGIN) - BULLET_INDENT;
                for (i, l) in wrap(&text, Font::Regular, BODY_SIZE, width).into_iter().enumerate() {
                    let mut runs = Vec::with_capacity(2);
                    if i == 0 {
                        runs.push(Run {
                            font: Font::Regular,
                            dx: 0.0,
                            text: m.clone(),
                        });
                    }
                    runs.push(Run {
                        font: Font::Regular,
                        dx: BULLET_INDENT,
                        text: l,
                    });
                    blocks.push(Block::Text {
                        runs,
                        x,
                        size: BODY_SIZE,
                        color: TEXT_COLOR,
                        gap_before: if i == 0 { gap * 0.5 } else { 0.0 },
                        keep_with_next: false,
                    });
                }
            }
            None => {
                let width = CONTENT_WIDTH - (x - MARGIN);
                for (i, l) in wrap(&text, Font::Regular, BODY_SIZE, width).into_iter().enumerate() {
                    blocks.push(
                        Block::line(Font::Regular, x, BODY_SIZE, l).gap(if i == 0 { gap } else { 0.0 }),
                    );
                }
            }
        }
        gap = 0.0;
    }
}

/// Greedy word wrap on measured widths. Words wider than the line are split.
fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let space = font.width(" ", size);
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let w = font.width(word, size);
        if current.is_empty() {
            if w <= max_width {
                current.push_str(word);
                current_width = w;
            } else {
                for piece in split_long_word(word, font, size, max_width) {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                    current_width = font.width(&piece, size);
                    current = piece;
                }
            }
        } else if current_width + space + w <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += space + w;
        } else {
            lines.push(std::mem::take(&mut current));
            current_width = 0.0;
            if w <= max_width {
                current.push_str(word);
                current_width = w;
            } else {
                for piece in split_long_word(word, font, size, max_width) {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                    current_width = font.width(&piece, size);
                    current = piece;
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn split_long_word(word: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(c);
        if !piece.is_empty() && font.width(&candidate, size) > max_width {
            pieces.push(std::mem::take(&mut piece));
            piece.push(c);
        } else {
            piece = candidate;
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

// ── Pass 2: blocks → pages ──────────────────────────────────────────────────

fn paginate(blocks: &[Block]) -> Vec<Vec<Placed<'_>>> {
    let top = PAGE_HEIGHT - MARGIN;
    let bottom = MARGIN + FOOTER_SPACE;

    let mut pages = Vec::new();
    let mut page: Vec<Placed<'_>> = Vec::new();
    let mut cursor = top;

    for (i, block) in blocks.iter().enumerate() {
        let mut gap = if page.is_empty() { 0.0 } else { block.gap_before() };
        let mut need = gap + block.height();

        // A heading chain moves as a unit with the first ordinary line after it.
        let mut j = i;
        while blocks[j].keeps_with_next() {
            match blocks.get(j + 1) {
                Some(next) => {
                    need += next.gap_before() + next.height();
                    j += 1;
                }
                None => break,
            }
        }

        if !page.is_empty() && cursor - need < bottom {
            pages.push(std::mem::take(&mut page));
            cursor = top;
            gap = 0.0;
        }

        cursor -= gap + block.height();
        page.push(Placed {
            block,
            baseline: cursor + block.descent(),
        });
    }

    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

fn emit_footer(page: usize, total: usize, ops: &mut Vec<Operation>) {
    let label = format!("Page {page} of {total}");
    let x = (PAGE_WIDTH - Font::Regular.width(&label, FOOTER_SIZE)) / 2.0;
    ops.push(fill_color(MUTED_COLOR));
    emit_text(Font::Regular, FOOTER_SIZE, x, MARGIN / 2.0, &label, ops);
}

fn fill_color(Rgb(r, g, b): Rgb) -> Operation {
    Operation::new(
        "rg",
        vec![Object::Real(r), Object::Real(g), Object::Real(b)],
    )
}

fn emit_text(font: Font, size: f32, x: f32, y: f32, text: &str, ops: &mut Vec<Operation>) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(font.resource().as_bytes().to_vec()), Object::Real(size)],
    ));
    ops.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(to_win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

// ── Text encoding ───────────────────────────────────────────────────────────

fn pdf_string(text: &str) -> Object {
    Object::String(to_win_ansi(text), StringFormat::Literal)
}

/// Encode text for a `WinAnsiEncoding` font.
pub fn to_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' '..='~' => out.push(c as u8),
            '\t' => out.push(b' '),
            '\u{A0}'..='\u{FF}' => out.push(c as u32 as u8),
            '€' => out.push(0x80),
            '‚' => out.push(0x82),
            '…' => out.push(0x85),
            '‘' => out.push(0x91),
            '’' => out.push(0x92),
            '“' => out.push(0x93),
            '”' => out.push(0x94),
            '•' => out.push(0x95),
            '–' => out.push(0x96),
            '—' => out.push(0x97),
            '™' => out.push(0x99),
            '≤' => out.extend_from_slice(b"<="),
            '≥' => out.extend_from_slice(b">="),
            '→' => out.extend_from_slice(b"->"),
            '✓' | '✔' => out.extend_from_slice(b"Yes"),
            '✗' | '✘' => out.extend_from_slice(b"No"),
            '\u{2212}' => out.push(b'-'),
            _ => out.push(b'?'),
        }
    }
    out
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

fn glyph_width(byte: u8) -> u16 {
    match byte {
        32..=126 => HELVETICA_WIDTHS[(byte - 32) as usize],
        0x91 | 0x92 | 0x82 => 222,
        0x93 | 0x94 => 333,
        0x95 => 350,
        0x97 | 0x99 | 0x85 => 1000,
        _ => 556,
    }
}
