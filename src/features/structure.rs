//! Structural descriptors.
//!
//! Executables and object files (PE, ELF, Mach-O, COFF) are parsed with the
//! `object` crate. Container and document formats (ZIP family, PDF, OLE) are
//! recognized from magic bytes and marker strings. Anything that cannot be
//! parsed is [`Structure::Unknown`]; parsing never fails the scan.

use super::layout::STRUCTURE_SLOTS;
use crate::entropy::shannon_entropy;
use crate::heuristics::apis::detect_suspicious_imports;
use memchr::memmem;
use object::{BinaryFormat, Object, ObjectSection, SectionFlags, SectionKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
const ZIP_CENTRAL: &[u8] = b"PK\x01\x02";
/// PDF headers may be preceded by junk; readers search the first KiB.
const PDF_HEADER_WINDOW: usize = 1024;
const PDF_ACTIVE_MARKERS: &[&[u8]] = &[
    b"/JavaScript",
    b"/JS",
    b"/OpenAction",
    b"/AA",
    b"/Launch",
    b"/EmbeddedFile",
];

/// Recognized container or executable format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Pe,
    Elf,
    MachO,
    Coff,
    Zip,
    Apk,
    Jar,
    Ooxml,
    Pdf,
    Ole,
}

impl FormatKind {
    /// One-hot slot of this format inside the structure sub-vector.
    fn slot(self) -> usize {
        match self {
            FormatKind::Pe => 0,
            FormatKind::Elf => 1,
            FormatKind::MachO => 2,
            FormatKind::Coff => 3,
            FormatKind::Zip => 4,
            FormatKind::Apk => 5,
            FormatKind::Jar => 6,
            FormatKind::Ooxml => 7,
            FormatKind::Pdf => 8,
            FormatKind::Ole => 9,
        }
    }

    /// Whether the format is a native executable or object file.
    pub fn is_executable(self) -> bool {
        matches!(
            self,
            FormatKind::Pe | FormatKind::Elf | FormatKind::MachO | FormatKind::Coff
        )
    }

    /// Whether the format is a ZIP-based package.
    pub fn is_archive(self) -> bool {
        matches!(
            self,
            FormatKind::Zip | FormatKind::Apk | FormatKind::Jar | FormatKind::Ooxml
        )
    }
}

/// Descriptors of a recognized artifact structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralDescriptors {
    pub format: Option<FormatKind>,
    pub is_64bit: bool,
    pub section_count: usize,
    pub executable_sections: usize,
    pub writable_executable_sections: usize,
    pub max_section_entropy: f64,
    pub mean_section_entropy: f64,
    pub entry_outside_code: bool,
    pub import_count: usize,
    /// Normalized names of suspicious imports, first-seen order.
    pub suspicious_imports: Vec<String>,
    /// Bytes past the last section's raw data (PE only).
    pub overlay_size: u64,
    pub has_symbols: bool,
    /// Bytes of executable section data.
    pub code_size: u64,
    pub archive_entries: usize,
    /// Bytecode or macro payload inside a container (dex, class, VBA).
    pub embedded_code: bool,
    pub pdf_objects: usize,
    pub active_content: usize,
    pub macros: bool,
}

/// Outcome of structural parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Structure {
    #[default]
    Unknown,
    Recognized(StructuralDescriptors),
}

impl Structure {
    pub fn format(&self) -> Option<FormatKind> {
        match self {
            Structure::Unknown => None,
            Structure::Recognized(d) => d.format,
        }
    }

    pub fn descriptors(&self) -> Option<&StructuralDescriptors> {
        match self {
            Structure::Unknown => None,
            Structure::Recognized(d) => Some(d),
        }
    }

    /// Structure sub-vector; all zeros for `Unknown`.
    pub fn to_slots(&self, file_len: usize) -> [f32; STRUCTURE_SLOTS] {
        match self {
            Structure::Unknown => [0.0; STRUCTURE_SLOTS],
            Structure::Recognized(d) => d.to_slots(file_len),
        }
    }
}

/// `ln(1+n) / ln(1+cap)`, saturating at 1.
fn log_scaled(n: usize, cap: f64) -> f32 {
    ((n as f64).ln_1p() / cap.ln_1p()).min(1.0) as f32
}

fn ratio(num: f64, den: f64) -> f32 {
    if den <= 0.0 {
        0.0
    } else {
        (num / den).clamp(0.0, 1.0) as f32
    }
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl StructuralDescriptors {
    pub fn to_slots(&self, file_len: usize) -> [f32; STRUCTURE_SLOTS] {
        let mut s = [0.0f32; STRUCTURE_SLOTS];
        if let Some(format) = self.format {
            s[format.slot()] = 1.0;
        }
        let sections = self.section_count as f64;
        let len = file_len as f64;
        s[10] = flag(self.is_64bit);
        s[11] = ratio(sections, 32.0);
        s[12] = ratio(self.executable_sections as f64, sections);
        s[13] = ratio(self.writable_executable_sections as f64, 2.0);
        s[14] = (self.max_section_entropy / 8.0).clamp(0.0, 1.0) as f32;
        s[15] = (self.mean_section_entropy / 8.0).clamp(0.0, 1.0) as f32;
        s[16] = flag(self.entry_outside_code);
        s[17] = log_scaled(self.import_count, 1024.0);
        s[18] = ratio(self.suspicious_imports.len() as f64, 8.0);
        s[19] = ratio(
            self.suspicious_imports.len() as f64,
            self.import_count as f64,
        );
        s[20] = ratio(self.overlay_size as f64, len);
        s[21] = flag(self.has_symbols);
        s[22] = log_scaled(self.archive_entries, 4096.0);
        s[23] = flag(self.embedded_code);
        s[24] = log_scaled(self.pdf_objects, 4096.0);
        s[25] = ratio(self.active_content as f64, 4.0);
        s[26] = flag(self.macros);
        s[27] = ratio(self.code_size as f64, len);
        s
    }
}

/// Parse the structure of `data`. Never fails; unknown or malformed input
/// yields [`Structure::Unknown`].
pub fn parse_structure(data: &[u8]) -> Structure {
    if data.starts_with(ZIP_LOCAL) {
        return Structure::Recognized(parse_zip(data));
    }
    if data.starts_with(OLE_MAGIC) {
        return Structure::Recognized(parse_ole(data));
    }
    let head = &data[..data.len().min(PDF_HEADER_WINDOW)];
    if memmem::find(head, b"%PDF-").is_some() {
        return Structure::Recognized(parse_pdf(data));
    }
    match object::File::parse(data) {
        Ok(file) => match parse_object(&file, data.len()) {
            Some(desc) => Structure::Recognized(desc),
            None => {
                debug!(format = ?file.format(), "Unsupported object format; structural features zero-filled");
                Structure::Unknown
            }
        },
        Err(e) => {
            if looks_executable(data) {
                warn!(error = %e, "Malformed executable header; structural features zero-filled");
            } else {
                debug!("Unrecognized format; structural features zero-filled");
            }
            Structure::Unknown
        }
    }
}

fn looks_executable(data: &[u8]) -> bool {
    data.starts_with(b"MZ")
        || data.starts_with(b"\x7fELF")
        || data.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
        || data.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
}

fn is_writable_exec(flags: SectionFlags) -> bool {
    match flags {
        SectionFlags::Elf { sh_flags } => {
            let w = u64::from(object::elf::SHF_WRITE);
            let x = u64::from(object::elf::SHF_EXECINSTR);
            sh_flags & w != 0 && sh_flags & x != 0
        }
        SectionFlags::Coff { characteristics } => {
            characteristics & object::pe::IMAGE_SCN_MEM_WRITE != 0
                && characteristics & object::pe::IMAGE_SCN_MEM_EXECUTE != 0
        }
        _ => false,
    }
}

fn parse_object(file: &object::File<'_>, file_len: usize) -> Option<StructuralDescriptors> {
    let format = match file.format() {
        BinaryFormat::Pe => FormatKind::Pe,
        BinaryFormat::Elf => FormatKind::Elf,
        BinaryFormat::MachO => FormatKind::MachO,
        BinaryFormat::Coff => FormatKind::Coff,
        _ => return None,
    };
    let mut d = StructuralDescriptors {
        format: Some(format),
        is_64bit: file.is_64(),
        ..StructuralDescriptors::default()
    };

    let entry = file.entry();
    let mut entry_in_code = false;
    let mut entropies = Vec::new();
    let mut raw_end = 0u64;
    for section in file.sections() {
        d.section_count += 1;
        let is_code = section.kind() == SectionKind::Text;
        if is_code {
            d.executable_sections += 1;
            d.code_size += section.size();
            let start = section.address();
            if entry >= start && entry < start.saturating_add(section.size()) {
                entry_in_code = true;
            }
        }
        if is_writable_exec(section.flags()) {
            d.writable_executable_sections += 1;
        }
        if let Some((offset, size)) = section.file_range() {
            raw_end = raw_end.max(offset.saturating_add(size));
        }
        if let Ok(bytes) = section.data() {
            if !bytes.is_empty() {
                entropies.push(shannon_entropy(bytes));
            }
        }
    }
    d.entry_outside_code = entry != 0 && d.executable_sections > 0 && !entry_in_code;
    if !entropies.is_empty() {
        d.max_section_entropy = entropies.iter().copied().fold(0.0, f64::max);
        d.mean_section_entropy = entropies.iter().sum::<f64>() / entropies.len() as f64;
    }
    if format == FormatKind::Pe && raw_end > 0 {
        d.overlay_size = (file_len as u64).saturating_sub(raw_end);
    }

    let imports: Vec<String> = match file.imports() {
        Ok(list) => list
            .iter()
            .map(|i| String::from_utf8_lossy(i.name()).into_owned())
            .collect(),
        Err(e) => {
            debug!(error = %e, "Import table unreadable");
            Vec::new()
        }
    };
    d.import_count = imports.len();
    d.suspicious_imports = detect_suspicious_imports(&imports);
    d.has_symbols = file.symbols().next().is_some();
    Some(d)
}

fn count(data: &[u8], needle: &[u8]) -> usize {
    memmem::find_iter(data, needle).count()
}

fn contains(data: &[u8], needle: &[u8]) -> bool {
    memmem::find(data, needle).is_some()
}

fn parse_zip(data: &[u8]) -> StructuralDescriptors {
    let central = count(data, ZIP_CENTRAL);
    let entries = if central > 0 {
        central
    } else {
        count(data, ZIP_LOCAL)
    };
    let has_dex = contains(data, b"classes.dex");
    let has_class = contains(data, b".class");
    let has_vba = contains(data, b"vbaProject.bin");
    let format = if contains(data, b"AndroidManifest.xml") && has_dex {
        FormatKind::Apk
    } else if contains(data, b"META-INF/MANIFEST.MF") && has_class {
        FormatKind::Jar
    } else if contains(data, b"[Content_Types].xml") {
        FormatKind::Ooxml
    } else {
        FormatKind::Zip
    };
    StructuralDescriptors {
        format: Some(format),
        archive_entries: entries,
        embedded_code: has_dex || has_class || has_vba,
        macros: has_vba,
        ..StructuralDescriptors::default()
    }
}

fn parse_pdf(data: &[u8]) -> StructuralDescriptors {
    let active = PDF_ACTIVE_MARKERS.iter().map(|m| count(data, m)).sum();
    StructuralDescriptors {
        format: Some(FormatKind::Pdf),
        pdf_objects: count(data, b"endobj"),
        active_content: active,
        embedded_code: contains(data, b"/JavaScript") || contains(data, b"/JS"),
        ..StructuralDescriptors::default()
    }
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn parse_ole(data: &[u8]) -> StructuralDescriptors {
    let macros = contains(data, &utf16le("_VBA_PROJECT"))
        || contains(data, &utf16le("Macros"))
        || contains(data, b"Attribute VB_");
    StructuralDescriptors {
        format: Some(FormatKind::Ole),
        embedded_code: macros,
        macros,
        ..StructuralDescriptors::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_are_unknown() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        assert_eq!(parse_structure(&data), Structure::Unknown);
        assert_eq!(Structure::Unknown.to_slots(data.len()), [0.0; STRUCTURE_SLOTS]);
    }

    #[test]
    fn truncated_pe_degrades_to_unknown() {
        let mut data = b"MZ".to_vec();
        data.extend_from_slice(&[0u8; 30]);
        assert_eq!(parse_structure(&data), Structure::Unknown);
    }

    #[test]
    fn apk_recognized() {
        let mut data = ZIP_LOCAL.to_vec();
        data.extend_from_slice(b"\0\0AndroidManifest.xml\0\0");
        data.extend_from_slice(ZIP_LOCAL);
        data.extend_from_slice(b"\0\0classes.dex\0\0");
        data.extend_from_slice(ZIP_CENTRAL);
        data.extend_from_slice(ZIP_CENTRAL);
        let s = parse_structure(&data);
        assert_eq!(s.format(), Some(FormatKind::Apk));
        let d = s.descriptors().unwrap();
        assert_eq!(d.archive_entries, 2);
        assert!(d.embedded_code);
        let slots = s.to_slots(data.len());
        assert_eq!(slots[5], 1.0);
        assert_eq!(slots[4], 0.0);
    }

    #[test]
    fn pdf_active_content() {
        let data = b"%PDF-1.7\n1 0 obj << /OpenAction 2 0 R >> endobj\n2 0 obj << /S /JavaScript /JS (app.alert(1)) >> endobj\n";
        let s = parse_structure(data);
        let d = s.descriptors().unwrap();
        assert_eq!(d.format, Some(FormatKind::Pdf));
        assert_eq!(d.pdf_objects, 2);
        assert_eq!(d.active_content, 3);
        assert!(d.embedded_code);
    }

    #[test]
    fn ole_macros() {
        let mut data = OLE_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 64]);
        data.extend_from_slice(&utf16le("_VBA_PROJECT"));
        let s = parse_structure(&data);
        assert_eq!(s.format(), Some(FormatKind::Ole));
        assert!(s.descriptors().unwrap().macros);
    }

    #[test]
    fn slots_stay_in_unit_range() {
        let d = StructuralDescriptors {
            format: Some(FormatKind::Pe),
            section_count: 100,
            executable_sections: 3,
            writable_executable_sections: 5,
            max_section_entropy: 7.9,
            import_count: 100_000,
            suspicious_imports: vec!["virtualalloc".into(); 20],
            overlay_size: 10_000,
            code_size: 10_000,
            ..StructuralDescriptors::default()
        };
        for v in d.to_slots(1000) {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
