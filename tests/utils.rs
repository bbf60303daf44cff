//! Byte-exact PDF fixtures.

use std::collections::{BTreeMap, BTreeSet};

use pdfclean::{CleanError, CleanOptions, RetainSet, clean};

/// Builds a PDF file piece by piece, remembering where each object starts.
pub struct PdfBuilder {
    pub buffer: Vec<u8>,
    pub offsets: BTreeMap<u32, usize>,
    pub deleted: BTreeSet<u32>,
}

#[allow(dead_code)]
impl PdfBuilder {
    pub fn new(version: &str) -> PdfBuilder {
        let mut buffer = format!("%PDF-{version}\n%").into_bytes();
        buffer.extend_from_slice(b"\xe2\xe3\xcf\xd3\n");
        PdfBuilder {
            buffer,
            offsets: BTreeMap::new(),
            deleted: BTreeSet::new(),
        }
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, number: u32, body: &str) -> &mut Self {
        self.offsets.insert(number, self.buffer.len());
        self.raw(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes())
    }

    /// A stream object whose `/Length` is `declared` regardless of the payload size.
    pub fn stream_with_length(&mut self, number: u32, declared: &str, extra: &str, content: &[u8]) -> &mut Self {
        self.offsets.insert(number, self.buffer.len());
        self.raw(format!("{number} 0 obj\n<< /Length {declared}{extra} >>\nstream\n").as_bytes());
        self.raw(content);
        self.raw(b"\nendstream\nendobj\n")
    }

    pub fn stream(&mut self, number: u32, extra: &str, content: &[u8]) -> &mut Self {
        self.stream_with_length(number, &content.len().to_string(), extra, content)
    }

    /// Write a classic section listing `numbers` and return its offset. Numbers that were never
    /// written, or were marked deleted, get free entries.
    pub fn table(&mut self, numbers: &[u32], trailer: &str) -> usize {
        let start = self.buffer.len();
        let mut text = String::from("xref\n");
        let mut numbers = numbers.to_vec();
        numbers.sort_unstable();
        let mut runs: Vec<Vec<u32>> = Vec::new();
        for number in numbers {
            match runs.last_mut() {
                Some(run) if run.last() == Some(&(number - 1)) => run.push(number),
                _ => runs.push(vec![number]),
            }
        }
        for run in runs {
            text.push_str(&format!("{} {}\n", run[0], run.len()));
            for number in run {
                let entry = match self.offsets.get(&number) {
                    _ if number == 0 => "0000000000 65535 f \n".to_string(),
                    Some(offset) if !self.deleted.contains(&number) => format!("{offset:010} 00000 n \n"),
                    _ => "0000000000 00001 f \n".to_string(),
                };
                text.push_str(&entry);
            }
        }
        text.push_str(&format!("trailer\n{trailer}\n"));
        self.raw(text.as_bytes());
        start
    }

    pub fn startxref(&mut self, offset: usize) -> &mut Self {
        self.raw(format!("startxref\n{offset}\n%%EOF\n").as_bytes())
    }

    /// Close the file with one section covering every object written so far.
    pub fn finish(mut self, trailer_entries: &str) -> Vec<u8> {
        let size = self.offsets.keys().next_back().map_or(1, |max| max + 1);
        let numbers: Vec<u32> = (0..size).collect();
        let start = self.table(&numbers, &format!("<< /Size {size} {trailer_entries} >>"));
        self.startxref(start);
        self.buffer
    }
}

/// Catalog 1, page tree 2, one page 3 with a content stream 4.
#[allow(dead_code)]
pub fn one_page(builder: &mut PdfBuilder) {
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>")
        .stream(4, "", b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET");
}

#[allow(dead_code)]
pub fn clean_bytes(input: &[u8], password: &str, retain: &RetainSet, options: &CleanOptions) -> Result<Vec<u8>, CleanError> {
    let mut output = Vec::new();
    clean(input, &mut output, password, retain, options)?;
    Ok(output)
}

#[allow(dead_code)]
pub fn clean_default(input: &[u8]) -> Vec<u8> {
    clean_bytes(input, "", &RetainSet::new(), &CleanOptions::default()).unwrap()
}

#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
