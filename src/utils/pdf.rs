//! Minimal single-page PDF 1.4 writer: Type1 Helvetica text and ruled lines.
//! Enough for payslips; no images, no embedded fonts.

use std::fmt::Write as _;

/// A4 in points
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Text {
        x: f32,
        y: f32,
        size: f32,
        font: Font,
        text: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

#[derive(Debug, Default, Clone)]
pub struct PdfPage {
    ops: Vec<Op>,
}

impl PdfPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// `y` is measured from the bottom of the page, as PDF does
    pub fn text(&mut self, x: f32, y: f32, size: f32, font: Font, text: impl Into<String>) -> &mut Self {
        self.ops.push(Op::Text {
            x,
            y,
            size,
            font,
            text: text.into(),
        });
        self
    }

    /// Right-aligned text ending at `right`, width estimated from Helvetica metrics
    pub fn text_right(&mut self, right: f32, y: f32, size: f32, font: Font, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        let x = right - estimate_width(&text, size);
        self.text(x, y, size, font, text)
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> &mut Self {
        self.ops.push(Op::Line { x1, y1, x2, y2 });
        self
    }

    fn content_stream(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                Op::Text { x, y, size, font, text } => {
                    let _ = writeln!(
                        out,
                        "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET",
                        font.resource(),
                        size,
                        x,
                        y,
                        escape_text(text)
                    );
                }
                Op::Line { x1, y1, x2, y2 } => {
                    let _ = writeln!(out, "0.5 w {:.2} {:.2} m {:.2} {:.2} l S", x1, y1, x2, y2);
                }
            }
        }
        out
    }

    /// Serialize as a complete PDF file
    pub fn render(&self) -> Vec<u8> {
        let content = self.content_stream();

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ),
        ];

        let mut out: Vec<u8> = Vec::with_capacity(1024 + content.len());
        out.extend_from_slice(b"%PDF-1.4\n");

        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_at = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in &offsets {
            let _ = write!(xref, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        );
        out.extend_from_slice(xref.as_bytes());

        out
    }
}

/// Escape a string literal for a content stream. Latin-1 characters become
/// octal escapes (WinAnsi), anything else is replaced by `?`.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

/// Rough Helvetica advance width, good enough for right alignment of
/// digits and labels
pub fn estimate_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            '0'..='9' | '$' => 556,
            '.' | ',' | ' ' => 278,
            '-' => 333,
            'A'..='Z' => 667,
            _ => 500,
        })
        .sum();
    units as f32 * size / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn renders_a_well_formed_file() {
        let mut page = PdfPage::new();
        page.text(50.0, 800.0, 16.0, Font::Bold, "Payslip")
            .line(50.0, 790.0, 545.0, 790.0);
        let bytes = page.render();
        let text = as_text(&bytes);

        assert!(bytes.starts_with(b"%PDF-1.4\n"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("BT /F2 16 Tf 50.00 800.00 Td (Payslip) Tj ET"));
        assert!(text.contains("0.5 w 50.00 790.00 m 545.00 790.00 l S"));
        assert!(text.contains("/Size 7"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let mut page = PdfPage::new();
        page.text(10.0, 10.0, 9.0, Font::Regular, "x");
        let bytes = page.render();
        let text = as_text(&bytes);

        let startxref: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(text[startxref..].starts_with("xref\n0 7\n"));

        let entries: Vec<usize> = text[startxref..]
            .lines()
            .skip(3)
            .take(6)
            .map(|l| l[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            let expected = format!("{} 0 obj", i + 1);
            assert!(text[*offset..].starts_with(&expected), "object {} misplaced", i + 1);
        }
    }

    #[test]
    fn stream_length_matches_content() {
        let mut page = PdfPage::new();
        page.text(10.0, 10.0, 9.0, Font::Regular, "Net pay (BDT)");
        let text = as_text(&page.render());

        let start = text.find("stream\n").unwrap() + "stream\n".len();
        let end = text.find("endstream").unwrap();
        let declared: usize = text
            .split("/Length ")
            .nth(1)
            .and_then(|s| s.split_whitespace().next())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(end - start, declared);
    }

    #[test]
    fn special_characters_are_escaped() {
        assert_eq!(escape_text("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(escape_text("José"), "Jos\\351");
        assert_eq!(escape_text("日本"), "??");
    }

    #[test]
    fn right_alignment_uses_width_estimate() {
        assert_eq!(estimate_width("10", 10.0), 11.12);
        let mut page = PdfPage::new();
        page.text_right(100.0, 0.0, 10.0, Font::Regular, "10");
        assert!(page.content_stream().contains("88.88 0.00 Td"));
    }
}
