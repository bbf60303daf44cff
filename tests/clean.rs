mod utils;

use pdfclean::{CleanError, CleanOptions, Document, Error, Object, ObjectId, RetainSet, clean_file, filters};
use utils::{PdfBuilder, clean_bytes, clean_default, init_logger, one_page};

fn ten_objects() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    for number in [4, 5, 6, 8, 9, 10] {
        builder.object(number, &format!("<< /Orphan {number} >>"));
    }
    builder.object(7, "<< /Note (keep me) /Back 1 0 R >>");
    builder.finish("/Root 1 0 R")
}

fn references(object: &Object, found: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => found.push(*id),
        Object::Array(array) => array.iter().for_each(|item| references(item, found)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| references(value, found)),
        Object::Stream(stream) => stream.dict.iter().for_each(|(_, value)| references(value, found)),
        _ => {}
    }
}

#[test]
fn retained_object_survives_and_garbage_goes() {
    init_logger();
    let retain: RetainSet = [7].into_iter().collect();
    let output = clean_bytes(&ten_objects(), "", &retain, &CleanOptions::default()).unwrap();
    let doc = Document::load_mem(&output).unwrap();

    let ids: Vec<_> = doc.objects.keys().copied().collect();
    assert_eq!(ids, vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
    let kept = doc.get_object((4, 0)).unwrap().as_dict().unwrap();
    assert_eq!(kept.get(b"Note").unwrap().as_str().unwrap(), b"keep me");
    assert_eq!(kept.get(b"Back").unwrap().as_reference().unwrap(), (1, 0));
}

#[test]
fn without_retain_only_the_page_tree_is_left() {
    let output = clean_default(&ten_objects());
    let doc = Document::load_mem(&output).unwrap();
    assert_eq!(doc.objects.len(), 3);
    assert!(doc.objects.values().all(|object| object.as_dict().is_ok_and(|dict| !dict.has(b"Orphan"))));
}

#[test]
fn every_reference_resolves_and_numbers_are_dense() {
    let mut builder = PdfBuilder::new("1.6");
    builder
        .object(3, "<< /Type /Catalog /Pages 9 0 R /Outlines 40 0 R >>")
        .object(9, "<< /Type /Pages /Kids [12 0 R] /Count 1 >>")
        .object(12, "<< /Type /Page /Parent 9 0 R /Annots [20 0 R 21 0 R] >>")
        .object(20, "<< /Type /Annot /P 12 0 R >>")
        .object(30, "(unused)");
    let output = clean_default(&builder.finish("/Root 3 0 R"));
    let doc = Document::load_mem(&output).unwrap();

    let numbers: Vec<u32> = doc.objects.keys().map(|id| id.0).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let mut found = Vec::new();
    for object in doc.objects.values() {
        references(object, &mut found);
    }
    assert!(found.iter().all(|id| doc.objects.contains_key(id)));

    // Dangling references to 21 and 40 became null.
    let catalog = doc.catalog().unwrap();
    assert!(catalog.get(b"Outlines").unwrap().is_null());
    let annots = doc.get_object((3, 0)).unwrap().as_dict().unwrap().get(b"Annots").unwrap();
    assert_eq!(annots.as_array().unwrap()[1], Object::Null);
}

#[test]
fn cleaning_twice_changes_nothing() {
    let mut builder = PdfBuilder::new("1.4");
    one_page(&mut builder);
    builder
        .object(5, "<< /Producer (fixture) /Ratio 0.25 /Extra 6 0 R >>")
        .object(6, "[1 2 3 7 0 R]")
        .stream_with_length(7, "8 0 R", " /Filter /ASCIIHexDecode", b"48656c6c6f>")
        .object(8, "11");
    let input = builder.finish("/Root 1 0 R /Info 5 0 R");

    let once = clean_default(&input);
    let twice = clean_default(&once);
    assert_eq!(once, twice);
}

#[test]
fn unknown_trailer_keys_do_not_keep_objects() {
    let mut builder = PdfBuilder::new("1.4");
    one_page(&mut builder);
    builder.object(5, "<< /Private (vendor data) >>");
    let input = builder.finish("/Root 1 0 R /Foo 5 0 R");

    let once = clean_default(&input);
    let doc = Document::load_mem(&once).unwrap();
    assert_eq!(doc.objects.len(), 4);
    assert!(!doc.trailer.has(b"Foo"));
    assert_eq!(clean_default(&once), once);
}

#[test]
fn reference_cycles_terminate() {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R /Loop 3 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /Next 4 0 R >>")
        .object(4, "<< /Next 3 0 R >>")
        .object(5, "<< /Self 5 0 R >>");
    let retain: RetainSet = [5].into_iter().collect();
    let output = clean_bytes(&builder.finish("/Root 1 0 R"), "", &retain, &CleanOptions::default()).unwrap();
    let doc = Document::load_mem(&output).unwrap();
    assert_eq!(doc.objects.len(), 5);
    let own = doc.get_object((5, 0)).unwrap().as_dict().unwrap();
    assert_eq!(own.get(b"Self").unwrap().as_reference().unwrap(), (5, 0));
}

#[test]
fn info_dictionary_is_kept() {
    let mut builder = PdfBuilder::new("1.4");
    one_page(&mut builder);
    builder.object(5, "<< /Title (Report) >>");
    let output = clean_default(&builder.finish("/Root 1 0 R /Info 5 0 R"));
    let doc = Document::load_mem(&output).unwrap();
    let info = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
    let title = doc.get_object(info).unwrap().as_dict().unwrap().get(b"Title").unwrap();
    assert_eq!(title.as_str().unwrap(), b"Report");
}

#[test]
fn xref_stream_output_reparses() {
    let mut builder = PdfBuilder::new("1.4");
    one_page(&mut builder);
    let input = builder.finish("/Root 1 0 R");
    let options = CleanOptions::builder().use_xref_streams(true).build();
    let output = clean_bytes(&input, "", &RetainSet::new(), &options).unwrap();

    assert!(output.starts_with(b"%PDF-1.5\n"));
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("/Type/XRef"));
    assert!(!text.contains("trailer"));

    let doc = Document::load_mem(&output).unwrap();
    assert_eq!(doc.objects.len(), 4);
    assert_eq!(doc.version, "1.5");
    let content = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert_eq!(content.content, b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET");
}

#[test]
fn compress_and_decompress_streams() {
    let text = b"0 0 m 200 200 l S\n".repeat(40);
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, "", &text);
    let input = builder.finish("/Root 1 0 R");

    let options = CleanOptions::builder().compress_streams(true).build();
    let compressed = clean_bytes(&input, "", &RetainSet::new(), &options).unwrap();
    assert!(compressed.len() < input.len());
    let doc = Document::load_mem(&compressed).unwrap();
    let stream = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert_eq!(stream.filters().unwrap(), vec![&b"FlateDecode"[..]]);
    assert_eq!(stream.decompressed_content().unwrap(), text);

    let options = CleanOptions::builder().decompress_streams(true).build();
    let plain = clean_bytes(&compressed, "", &RetainSet::new(), &options).unwrap();
    let doc = Document::load_mem(&plain).unwrap();
    let stream = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert!(!stream.dict.has(b"Filter"));
    assert_eq!(stream.content, text);
}

#[test]
fn flate_input_passes_through_by_default() {
    let payload = filters::flate_encode(b"q 1 0 0 1 0 0 cm Q").unwrap();
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, " /Filter /FlateDecode", &payload);
    let output = clean_default(&builder.finish("/Root 1 0 R"));
    let doc = Document::load_mem(&output).unwrap();
    assert_eq!(doc.get_object((4, 0)).unwrap().as_stream().unwrap().content, payload);
}

#[test]
fn memory_limit_aborts_the_operation() {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, "", &[b'x'; 4096]);
    let input = builder.finish("/Root 1 0 R");

    let options = CleanOptions::builder().memory_limit(1024).build();
    let mut output = Vec::new();
    let err = pdfclean::clean(&input, &mut output, "", &RetainSet::new(), &options).unwrap_err();
    assert!(matches!(err, CleanError::MalformedStructure(Error::MemoryLimit { limit: 1024, .. })));
    assert!(output.is_empty());

    let options = CleanOptions::builder().memory_limit(1 << 20).build();
    assert!(clean_bytes(&input, "", &RetainSet::new(), &options).is_ok());
}

#[test]
fn clean_file_writes_output_only_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.pdf");
    let output = dir.path().join("output.pdf");

    std::fs::write(&input, b"%PDF-1.4\n1 0 obj\n<< /Kind /Nothing >>\nendobj\n").unwrap();
    let err = clean_file(&input, &output, "", &RetainSet::new(), &CleanOptions::default()).unwrap_err();
    assert!(matches!(err, CleanError::MalformedStructure(_)));
    assert!(!output.exists());

    let mut builder = PdfBuilder::new("1.4");
    one_page(&mut builder);
    std::fs::write(&input, builder.finish("/Root 1 0 R")).unwrap();
    clean_file(&input, &output, "", &RetainSet::new(), &CleanOptions::default()).unwrap();
    assert_eq!(Document::load(&output).unwrap().objects.len(), 4);
}

#[test]
fn unsupported_version_is_reported() {
    let mut builder = PdfBuilder::new("3.0");
    one_page(&mut builder);
    let err = clean_bytes(&builder.finish("/Root 1 0 R"), "", &RetainSet::new(), &CleanOptions::default()).unwrap_err();
    assert!(matches!(err, CleanError::UnsupportedVersion(version) if version == "3.0"));
}
