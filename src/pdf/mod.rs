//! # PDF Output
//!
//! Writes frozen [`FontTables`] as PDF font objects, plus a small
//! single-font text document writer used by the CLI.
//!
//! ## Font objects
//!
//! ```text
//! CID font:    FontFile2, FontDescriptor, CIDFontType2,
//!              Encoding CMap, ToUnicode CMap, Type0 (root)
//! Simple font: FontFile2, FontDescriptor, TrueType (root)
//! ```
//!
//! The Type0 root names its Encoding CMap stream rather than
//! `/Identity-H`, since codes are not glyph ids unless the font uses the
//! identity policy.

use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::embed::{FontEncoding, FontTables, SubsetFont};
use crate::error::SubsetError;
use crate::font::{FaceMetrics, FontSource};

const PAGE_WIDTH: f64 = 595.28;
const PAGE_HEIGHT: f64 = 841.89;
const MARGIN: f64 = 72.0;

/// Write bytes as a PDF literal string, parentheses included.
///
/// `(`, `)` and `\` are backslash-escaped; CR is written as `\r` since a
/// bare CR inside a literal string reads back as LF.
pub fn literal_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

/// Tracks allocated PDF objects during writing. Object 0 is the free-list
/// head and is never written.
pub struct PdfBuilder {
    objects: Vec<PdfObject>,
    compress: bool,
}

struct PdfObject {
    data: Vec<u8>,
}

impl PdfBuilder {
    pub fn new(compress: bool) -> Self {
        Self {
            objects: vec![PdfObject { data: Vec::new() }],
            compress,
        }
    }

    /// Allocate an object id to be filled in later.
    pub fn reserve(&mut self) -> usize {
        self.add(Vec::new())
    }

    pub fn add(&mut self, data: Vec<u8>) -> usize {
        self.objects.push(PdfObject { data });
        self.objects.len() - 1
    }

    pub fn set(&mut self, id: usize, data: Vec<u8>) {
        if let Some(obj) = self.objects.get_mut(id) {
            obj.data = data;
        }
    }

    /// Add a stream object. `extra` holds dictionary entries besides
    /// `/Length` and `/Filter`.
    pub fn add_stream(&mut self, extra: &str, content: &[u8]) -> usize {
        let mut data: Vec<u8> = Vec::new();
        let body = if self.compress {
            compress_to_vec_zlib(content, 6)
        } else {
            content.to_vec()
        };
        let filter = if self.compress { " /Filter /FlateDecode" } else { "" };
        let _ = write!(data, "<< /Length {}{}{} >>\nstream\n", body.len(), filter, extra);
        data.extend_from_slice(&body);
        data.extend_from_slice(b"\nendstream");
        self.add(data)
    }

    /// Serialize all objects into the final PDF byte stream.
    pub fn serialize(&self, root: usize) -> Vec<u8> {
        let mut output: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = vec![0; self.objects.len()];

        output.extend_from_slice(b"%PDF-1.7\n");
        output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

        for (i, obj) in self.objects.iter().enumerate().skip(1) {
            offsets[i] = output.len();
            let _ = write!(output, "{} 0 obj\n", i);
            output.extend_from_slice(&obj.data);
            output.extend_from_slice(b"\nendobj\n\n");
        }

        let xref_offset = output.len();
        let _ = write!(output, "xref\n0 {}\n", self.objects.len());
        let _ = write!(output, "0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            let _ = write!(output, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            output,
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.objects.len(),
            root,
            xref_offset
        );
        output
    }
}

fn scaled(value: i16, units_per_em: u16) -> i32 {
    (value as f64 * 1000.0 / units_per_em.max(1) as f64) as i32
}

fn font_descriptor(tables: &FontTables, font_file: usize) -> String {
    let FaceMetrics {
        units_per_em: upem,
        ascender,
        descender,
        cap_height,
        bbox,
        italic_angle,
    } = tables.face;
    // Symbolic (4) for CID fonts and symbol fonts, Nonsymbolic (32) otherwise.
    let flags = match tables.encoding {
        FontEncoding::Simple { .. } if !tables.symbolic => 32,
        _ => 4,
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} \
         /FontBBox [{} {} {} {}] /ItalicAngle {} \
         /Ascent {} /Descent {} /CapHeight {} /StemV 80 \
         /FontFile2 {} 0 R >>",
        tables.base_font,
        flags,
        scaled(bbox.x_min, upem),
        scaled(bbox.y_min, upem),
        scaled(bbox.x_max, upem),
        scaled(bbox.y_max, upem),
        italic_angle,
        scaled(ascender, upem),
        scaled(descender, upem),
        scaled(cap_height, upem),
        font_file,
    )
}

/// Write the objects for one frozen font. Returns the id of the font
/// dictionary to reference from `/Resources`.
pub fn write_font_objects(builder: &mut PdfBuilder, tables: &FontTables) -> usize {
    let font_file = builder.add_stream(
        &format!(" /Length1 {}", tables.font_program.len()),
        &tables.font_program,
    );
    let descriptor = builder.add(font_descriptor(tables, font_file).into_bytes());

    match &tables.encoding {
        FontEncoding::Simple {
            first_char,
            last_char,
            widths,
            ..
        } => {
            let encoding = if tables.symbolic { "" } else { " /Encoding /WinAnsiEncoding" };
            let dict = format!(
                "<< /Type /Font /Subtype /TrueType /BaseFont /{} \
                 /FirstChar {} /LastChar {} /Widths {} \
                 /FontDescriptor {} 0 R{} >>",
                tables.base_font, first_char, last_char, widths, descriptor, encoding,
            );
            builder.add(dict.into_bytes())
        }
        FontEncoding::Cid {
            encoding_name,
            encoding_cmap,
            to_unicode_cmap,
            default_width,
            widths,
        } => {
            let cid_font = builder.add(
                format!(
                    "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
                     /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
                     /FontDescriptor {} 0 R /DW {} /W {} \
                     /CIDToGIDMap /Identity >>",
                    tables.base_font, descriptor, default_width, widths,
                )
                .into_bytes(),
            );
            let cmap = builder.add_stream(
                &format!(
                    " /Type /CMap /CMapName /{} \
                     /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >>",
                    encoding_name
                ),
                encoding_cmap,
            );
            let to_unicode = builder.add_stream("", to_unicode_cmap);
            builder.add(
                format!(
                    "<< /Type /Font /Subtype /Type0 /BaseFont /{} \
                     /Encoding {} 0 R /DescendantFonts [{} 0 R] \
                     /ToUnicode {} 0 R >>",
                    tables.base_font, cmap, cid_font, to_unicode,
                )
                .into_bytes(),
            )
        }
    }
}

/// Greedy word wrap by measured width.
fn wrap<S: FontSource>(font: &SubsetFont<S>, text: &str, size: f64, max_width: f64) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if !line.is_empty() && font.measure(&candidate, size) > max_width {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub struct PdfWriter;

impl PdfWriter {
    /// Lay out `text` in one font on as many A4 pages as needed.
    ///
    /// Each line is requested and encoded before the next one is looked
    /// at, the way a streaming layout engine would drive the font.
    pub fn write_text_document<S: FontSource>(
        font: &mut SubsetFont<S>,
        text: &str,
        size: f64,
    ) -> Result<Vec<u8>, SubsetError> {
        let leading = size * 1.2;
        let lines_per_page = (((PAGE_HEIGHT - 2.0 * MARGIN) / leading).floor() as usize).max(1);
        let lines = wrap(font, text, size, PAGE_WIDTH - 2.0 * MARGIN);

        let mut streams: Vec<Vec<u8>> = Vec::new();
        for page_lines in lines.chunks(lines_per_page) {
            let mut content: Vec<u8> = Vec::new();
            let _ = write!(
                content,
                "BT\n/F1 {} Tf\n{:.2} TL\n{:.2} {:.2} Td\n",
                size,
                leading,
                MARGIN,
                PAGE_HEIGHT - MARGIN - size
            );
            for line in page_lines {
                let encoded = font.show(line)?;
                content.extend_from_slice(&literal_string(&encoded));
                content.extend_from_slice(b" Tj T*\n");
            }
            content.extend_from_slice(b"ET\n");
            streams.push(content);
        }

        let compress = font.config().compress_streams;
        let tables = font.tables()?;
        let mut builder = PdfBuilder::new(compress);
        let catalog = builder.reserve();
        let pages = builder.reserve();
        let font_id = write_font_objects(&mut builder, tables);

        let mut kids: Vec<usize> = Vec::new();
        for stream in &streams {
            let contents = builder.add_stream("", stream);
            let page = builder.add(
                format!(
                    "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {:.2} {:.2}] \
                     /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >>",
                    pages, PAGE_WIDTH, PAGE_HEIGHT, contents, font_id
                )
                .into_bytes(),
            );
            kids.push(page);
        }

        builder.set(catalog, format!("<< /Type /Catalog /Pages {} 0 R >>", pages).into_bytes());
        let mut kids_list = String::new();
        for id in &kids {
            let _ = write!(kids_list, "{} 0 R ", id);
        }
        builder.set(
            pages,
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids_list.trim_end(), kids.len()).into_bytes(),
        );

        Ok(builder.serialize(catalog))
    }
}
