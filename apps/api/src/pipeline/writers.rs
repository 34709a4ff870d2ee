//! Letter writers: the rich PDF writer and the plain Markdown writer.
//!
//! Writers are synchronous and CPU-bound; the render stage runs them on the
//! blocking pool.

use std::io::BufWriter;

use bytes::Bytes;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use thiserror::Error;

use crate::pipeline::models::{ArtifactFormat, AssembledLetter, MediaKind};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Writer backend error: {0}")]
    Backend(String),

    #[error("Buffer error: {0}")]
    Buffer(String),
}

pub trait LetterWriter: Send + Sync {
    fn format(&self) -> ArtifactFormat;

    fn media(&self) -> MediaKind;

    fn write(&self, letter: &AssembledLetter) -> Result<Bytes, WriteError>;
}

/// `Letter_<company>_<title>.<ext>`, keeping only filename-safe characters.
pub fn file_name(letter: &AssembledLetter, media: MediaKind) -> String {
    format!(
        "Letter_{}_{}.{}",
        sanitize(&letter.header.company_name),
        sanitize(&letter.header.job_title),
        media.extension()
    )
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let collapsed = cleaned
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if collapsed.is_empty() {
        "untitled".to_string()
    } else {
        collapsed
    }
}

fn formatted_date(letter: &AssembledLetter) -> String {
    letter.generated_at.format("%B %d, %Y").to_string()
}

/// Contact lines of the header, skipping blank fields.
fn contact_lines(letter: &AssembledLetter) -> Vec<&str> {
    [
        letter.header.candidate_name.as_str(),
        letter.header.email.as_str(),
        letter.header.phone.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .collect()
}

// ─── PDF ─────────────────────────────────────────────────────────────────────

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 25.0;
const BODY_SIZE: f32 = 11.0;
const LINE_HEIGHT_MM: f32 = 5.5;
const PARAGRAPH_GAP_MM: f32 = 4.0;
const WRAP_CHARS: usize = 88;

/// Rich writer backed by `printpdf` with the built-in Helvetica faces.
pub struct PdfLetterWriter;

/// Tracks the write position and starts a new page when the bottom margin is reached.
struct PageCursor<'a> {
    doc: &'a printpdf::PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PageCursor<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        if self.y < MARGIN_MM {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        self.layer.use_text(text, size, Mm(MARGIN_MM), Mm(self.y), font);
        self.y -= LINE_HEIGHT_MM;
    }

    fn wrapped(&mut self, text: &str, font: &IndirectFontRef) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.line(&line, BODY_SIZE, font);
        }
    }

    fn gap(&mut self) {
        self.y -= PARAGRAPH_GAP_MM;
    }
}

impl LetterWriter for PdfLetterWriter {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Primary
    }

    fn media(&self) -> MediaKind {
        MediaKind::Pdf
    }

    fn write(&self, letter: &AssembledLetter) -> Result<Bytes, WriteError> {
        let title = format!(
            "Application Letter - {} - {}",
            letter.header.company_name, letter.header.job_title
        );
        let (doc, page1, layer1) =
            PdfDocument::new(&title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| WriteError::Backend(format!("PDF font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| WriteError::Backend(format!("PDF font error: {e}")))?;

        let mut cursor = PageCursor {
            doc: &doc,
            layer: doc.get_page(page1).get_layer(layer1),
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        };

        // Header
        for (i, line) in contact_lines(letter).into_iter().enumerate() {
            let (size, face) = if i == 0 { (14.0, &bold) } else { (BODY_SIZE, &font) };
            cursor.line(line, size, face);
        }
        cursor.gap();
        cursor.line(&formatted_date(letter), BODY_SIZE, &font);
        cursor.gap();
        cursor.line("Hiring Manager", BODY_SIZE, &font);
        cursor.line(&letter.header.company_name, BODY_SIZE, &font);
        cursor.gap();
        cursor.line("Dear Hiring Manager,", BODY_SIZE, &font);
        cursor.gap();

        // Body
        for paragraph in &letter.paragraphs {
            cursor.wrapped(&paragraph.text, &font);
            cursor.gap();
        }

        cursor.line("Sincerely,", BODY_SIZE, &font);
        cursor.gap();
        cursor.line(&letter.header.candidate_name, BODY_SIZE, &bold);

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| WriteError::Backend(format!("PDF save error: {e}")))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| WriteError::Buffer(format!("PDF buffer error: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ─── Markdown ────────────────────────────────────────────────────────────────

/// Plain writer. Output doubles as the input of the format converter.
pub struct MarkdownLetterWriter;

impl MarkdownLetterWriter {
    pub fn render(letter: &AssembledLetter) -> String {
        let mut out = String::new();
        out.push_str("# Application Letter\n\n");
        out.push_str(&format!(
            "**{} – {}**\n\n---\n\n",
            letter.header.company_name, letter.header.job_title
        ));
        // two trailing spaces force a Markdown line break
        out.push_str(&contact_lines(letter).join("  \n"));
        out.push_str("\n\n");
        out.push_str(&formatted_date(letter));
        out.push_str("\n\nHiring Manager  \n");
        out.push_str(&letter.header.company_name);
        out.push_str("\n\nDear Hiring Manager,\n\n");
        for paragraph in &letter.paragraphs {
            out.push_str(&paragraph.text);
            out.push_str("\n\n");
        }
        out.push_str("Sincerely,\n\n");
        out.push_str(&letter.header.candidate_name);
        out.push_str("\n\n---\n\n");
        out.push_str(&format!(
            "*Generated on {}*\n",
            letter.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));
        out
    }
}

impl LetterWriter for MarkdownLetterWriter {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Fallback
    }

    fn media(&self) -> MediaKind {
        MediaKind::Markdown
    }

    fn write(&self, letter: &AssembledLetter) -> Result<Bytes, WriteError> {
        Ok(Bytes::from(Self::render(letter)))
    }
}
