/*!
 * Fonts of written documents.
 *
 * Text is split into runs by the first font able to show each character:
 * a standard-14 font with WinAnsi encoding, then an embedded TrueType font
 * (Type0, Identity-H, glyph ids as character codes), then the predefined
 * Adobe-GB1 font `STSong-Light` that viewers supply themselves.
 */

use ab_glyph::{Font, FontVec, GlyphId};
use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::errors::PipelineError;

/// TrueType fonts tried when none is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/source-han-serif/SourceHanSerifCN-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSerifSC-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansSC-Regular.ttf",
    "/usr/share/fonts/truetype/arphic-gbsn00lp/gbsn00lp.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\simhei.ttf",
    "C:\\Windows\\Fonts\\arialuni.ttf",
];

/// Predefined CJK font, not embedded
const CJK_FONT: &str = "STSong-Light";
const CJK_ENCODING: &str = "UniGB-UCS2-H";

/// Map a source font name to a PDF standard-14 font
pub fn standard_font(font: &str) -> &'static str {
    let name = font.rsplit('+').next().unwrap_or(font).to_lowercase();
    let bold = name.contains("bold") || name.contains("black") || name.contains("heavy");
    let italic = name.contains("ital") || name.contains("oblique");

    if name.contains("mono") || name.contains("courier") || name.contains("code") || name.starts_with("cmtt") {
        return match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        };
    }
    let serif = name.contains("times") || (name.contains("serif") && !name.contains("sans"));
    if serif || name.starts_with("cm") {
        return match (bold, italic || name.starts_with("cmmi")) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        };
    }
    match (bold, italic) {
        (true, true) => "Helvetica-BoldOblique",
        (true, false) => "Helvetica-Bold",
        (false, true) => "Helvetica-Oblique",
        (false, false) => "Helvetica",
    }
}

/// WinAnsi code of a character, if it has one
pub fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' => c as u8,
        '\u{A0}'..='\u{FF}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        '„' => 0x84,
        '…' => 0x85,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '™' => 0x99,
        _ => return None,
    };
    Some(byte)
}

fn sanitize_font_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .collect();
    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

/// TrueType font embedded whole as a `FontFile2` stream
pub struct EmbeddedFont {
    name: String,
    data: Vec<u8>,
    font: FontVec,
}

impl fmt::Debug for EmbeddedFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl EmbeddedFont {
    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self, PipelineError> {
        let font = FontVec::try_from_vec(data.clone()).map_err(|_| {
            PipelineError::AssetUnavailable(format!("'{}' is not a valid TrueType font", name))
        })?;
        Ok(Self {
            name: sanitize_font_name(name),
            data,
            font,
        })
    }

    /// Load a `.ttf` file; collections and CFF fonts cannot go in `FontFile2`
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let is_ttf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("ttf"));
        if !is_ttf {
            return Err(PipelineError::AssetUnavailable(format!(
                "Only TrueType (.ttf) fonts can be embedded: {:?}",
                path
            )));
        }
        let data = fs::read(path).map_err(|e| {
            PipelineError::AssetUnavailable(format!("Cannot read font {:?}: {}", path, e))
        })?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("EmbeddedFont");
        Self::from_bytes(stem, data)
    }

    /// First readable font of the usual system locations
    pub fn discover() -> Option<Self> {
        let found = SYSTEM_FONTS
            .iter()
            .map(Path::new)
            .filter(|path| path.exists())
            .find_map(|path| match Self::load(path) {
                Ok(font) => Some(font),
                Err(e) => {
                    debug!("Skipping system font: {}", e);
                    None
                }
            });
        match &found {
            Some(font) => debug!("Embedding system font {}", font.name),
            None => warn!(
                "No TrueType font found, text outside Latin-1 relies on the viewer's {} font",
                CJK_FONT
            ),
        }
        found
    }

    /// The configured font, or a system font when none is configured
    pub fn resolve(configured: Option<&Path>) -> Result<Option<Self>, PipelineError> {
        match configured {
            Some(path) => Self::load(path).map(Some),
            None => Ok(Self::discover()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Glyph id of `c`, if the font covers it
    pub fn glyph(&self, c: char) -> Option<u16> {
        let id = self.font.glyph_id(c);
        (id.0 != 0).then_some(id.0)
    }

    fn units_per_em(&self) -> f32 {
        self.font.units_per_em().unwrap_or(1000.0)
    }

    /// Advance of a glyph in text space units (1/1000 em)
    fn width(&self, glyph: u16) -> i64 {
        (self.font.h_advance_unscaled(GlyphId(glyph)) * 1000.0 / self.units_per_em()).round() as i64
    }

    fn metric(&self, value: f32) -> i64 {
        (value * 1000.0 / self.units_per_em()).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Standard,
    Embedded,
    Cjk,
}

/// A string shown with one font resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub resource: String,
    pub bytes: Vec<u8>,
    /// Two-byte codes of a composite font
    pub composite: bool,
}

impl TextRun {
    pub fn object(&self) -> Object {
        let format = if self.composite {
            StringFormat::Hexadecimal
        } else {
            StringFormat::Literal
        };
        Object::String(self.bytes.clone(), format)
    }
}

/// Font resources used by one document
#[derive(Debug, Default)]
pub struct FontTable {
    embedded: Option<Arc<EmbeddedFont>>,
    standard: BTreeMap<&'static str, String>,
    embedded_resource: Option<String>,
    /// Glyphs shown with the embedded font, for widths and ToUnicode
    embedded_glyphs: BTreeMap<u16, char>,
    cjk_resource: Option<String>,
    count: usize,
}

impl FontTable {
    pub fn new(embedded: Option<Arc<EmbeddedFont>>) -> Self {
        Self {
            embedded,
            ..Self::default()
        }
    }

    /// Number of font resources handed out so far
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn next_resource(&mut self) -> String {
        self.count += 1;
        format!("F{}", self.count)
    }

    fn standard_resource(&mut self, font: &str) -> String {
        let base = standard_font(font);
        if let Some(resource) = self.standard.get(base) {
            return resource.clone();
        }
        let resource = self.next_resource();
        self.standard.insert(base, resource.clone());
        resource
    }

    fn embedded_resource(&mut self) -> String {
        if let Some(resource) = &self.embedded_resource {
            return resource.clone();
        }
        let resource = self.next_resource();
        self.embedded_resource = Some(resource.clone());
        resource
    }

    fn cjk_resource(&mut self) -> String {
        if let Some(resource) = &self.cjk_resource {
            return resource.clone();
        }
        let resource = self.next_resource();
        self.cjk_resource = Some(resource.clone());
        resource
    }

    fn encode(&mut self, c: char) -> (Face, Vec<u8>) {
        if let Some(byte) = win_ansi_byte(c) {
            return (Face::Standard, vec![byte]);
        }
        let glyph = self.embedded.as_ref().and_then(|font| font.glyph(c));
        if let Some(glyph) = glyph {
            self.embedded_glyphs.entry(glyph).or_insert(c);
            return (Face::Embedded, glyph.to_be_bytes().to_vec());
        }
        // UCS-2 only reaches the BMP
        let code = u16::try_from(u32::from(c)).unwrap_or(u16::from(b'?'));
        (Face::Cjk, code.to_be_bytes().to_vec())
    }

    /// Split `text` into runs, each shown with a single font resource
    pub fn runs(&mut self, font: &str, text: &str) -> Vec<TextRun> {
        let mut pieces: Vec<(Face, Vec<u8>)> = Vec::new();
        for c in text.chars() {
            let (face, code) = self.encode(c);
            match pieces.last_mut() {
                Some((last, bytes)) if *last == face => bytes.extend(code),
                _ => pieces.push((face, code)),
            }
        }

        pieces
            .into_iter()
            .map(|(face, bytes)| {
                let resource = match face {
                    Face::Standard => self.standard_resource(font),
                    Face::Embedded => self.embedded_resource(),
                    Face::Cjk => self.cjk_resource(),
                };
                TextRun {
                    resource,
                    bytes,
                    composite: face != Face::Standard,
                }
            })
            .collect()
    }

    /// Add the font objects to `document` and return the `/Font` resources
    pub fn dictionary(&self, document: &mut Document) -> Dictionary {
        let mut fonts = Dictionary::new();
        for (base, resource) in &self.standard {
            let id = document.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => *base,
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(resource.as_str(), id);
        }
        if let (Some(resource), Some(font)) = (&self.embedded_resource, &self.embedded) {
            let id = embedded_font_object(document, font, &self.embedded_glyphs);
            fonts.set(resource.as_str(), id);
        }
        if let Some(resource) = &self.cjk_resource {
            let id = cjk_font_object(document);
            fonts.set(resource.as_str(), id);
        }
        fonts
    }
}

fn embedded_font_object(document: &mut Document, font: &EmbeddedFont, glyphs: &BTreeMap<u16, char>) -> ObjectId {
    let file_id = document.add_object(Stream::new(
        dictionary! { "Length1" => Object::Integer(font.data.len() as i64) },
        font.data.clone(),
    ));
    let descriptor_id = document.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.name.as_str(),
        "Flags" => Object::Integer(4),
        "FontBBox" => vec![
            Object::Integer(0),
            Object::Integer(-300),
            Object::Integer(1000),
            Object::Integer(1000),
        ],
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Integer(font.metric(font.font.ascent_unscaled())),
        "Descent" => Object::Integer(font.metric(font.font.descent_unscaled())),
        "CapHeight" => Object::Integer(700),
        "StemV" => Object::Integer(80),
        "FontFile2" => file_id,
    });

    let mut widths = Vec::with_capacity(glyphs.len() * 2);
    for glyph in glyphs.keys() {
        widths.push(Object::Integer(i64::from(*glyph)));
        widths.push(Object::Array(vec![Object::Integer(font.width(*glyph))]));
    }
    let cid_font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => font.name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => Object::Integer(0),
        },
        "FontDescriptor" => descriptor_id,
        "DW" => Object::Integer(1000),
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = document.add_object(Stream::new(Dictionary::new(), to_unicode_cmap(glyphs)));
    document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => font.name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    })
}

fn cjk_font_object(document: &mut Document) -> ObjectId {
    let descriptor_id = document.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => CJK_FONT,
        "Flags" => Object::Integer(6),
        "FontBBox" => vec![
            Object::Integer(-25),
            Object::Integer(-254),
            Object::Integer(1000),
            Object::Integer(880),
        ],
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Integer(880),
        "Descent" => Object::Integer(-120),
        "CapHeight" => Object::Integer(880),
        "StemV" => Object::Integer(93),
    });
    let cid_font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => CJK_FONT,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("GB1"),
            "Supplement" => Object::Integer(4),
        },
        "FontDescriptor" => descriptor_id,
        "DW" => Object::Integer(1000),
    });
    document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => CJK_FONT,
        "Encoding" => CJK_ENCODING,
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
    })
}

/// ToUnicode CMap from glyph ids back to text
pub fn to_unicode_cmap(glyphs: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    let entries: Vec<(u16, char)> = glyphs.iter().map(|(g, c)| (*g, *c)).collect();
    // bfchar blocks hold at most 100 entries
    for block in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph, c) in block {
            let mut units = [0u16; 2];
            let text: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", glyph, text));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap.into_bytes()
}
