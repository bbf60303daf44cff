//! Checks that serialized output describes the document it was written from.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use crate::budget::MemoryBudget;
use crate::parser::{self, ParserInput};
use crate::writer::WriteSummary;
use crate::xref::XrefEntry;
use crate::{Document, Error, Result};

/// Check every cross-reference offset of `output`, then optionally parse it again.
///
/// `password` opens the output when it was encrypted. Re-parsing compares the set of object
/// numbers and the catalog reference with `document`.
pub fn verify_output(
    output: &[u8], summary: &WriteSummary, document: &Document, password: &str, reparse: bool,
) -> Result<()> {
    check_offsets(output, summary)?;
    if reparse {
        check_reparse(output, document, password)?;
    }
    Ok(())
}

fn check_offsets(output: &[u8], summary: &WriteSummary) -> Result<()> {
    let xref = &summary.xref;
    if xref.entries.len() != xref.size as usize || xref.max_id().saturating_add(1) != xref.size {
        return Err(Error::Verification(format!(
            "{} cross-reference entries for /Size {}",
            xref.entries.len(),
            xref.size
        )));
    }

    for (&number, entry) in &xref.entries {
        let XrefEntry::Normal { offset, generation } = *entry else {
            continue;
        };
        let found = output
            .get(offset as usize..)
            .and_then(|rest| parser::object_header(ParserInput::new_extra(rest, "verify")));
        if found != Some((number, generation)) {
            return Err(Error::Verification(format!(
                "byte offset {offset} does not start object {number} {generation}"
            )));
        }
    }

    let section = output.get(summary.xref_start..).unwrap_or_default();
    if !section.starts_with(b"xref") && parser::object_header(ParserInput::new_extra(section, "verify")).is_none() {
        return Err(Error::Verification(format!(
            "startxref {} does not point at a cross-reference section",
            summary.xref_start
        )));
    }
    Ok(())
}

fn check_reparse(output: &[u8], document: &Document, password: &str) -> Result<()> {
    let budget = Arc::new(MemoryBudget::new(document.budget.limit()));
    let reparsed = Document::load_mem_with_budget(output, password, budget)
        .map_err(|err| Error::Verification(format!("output does not parse: {err}")))?;

    let expected: BTreeSet<u32> = document.objects.keys().map(|id| id.0).collect();
    let found: BTreeSet<u32> = reparsed.objects.keys().map(|id| id.0).collect();
    if expected != found {
        let missing: Vec<_> = expected.difference(&found).collect();
        let extra: Vec<_> = found.difference(&expected).collect();
        return Err(Error::Verification(format!(
            "object numbers differ after re-parse (missing {missing:?}, unexpected {extra:?})"
        )));
    }

    let expected_root = document.trailer.get(b"Root").and_then(|root| root.as_reference()).ok();
    let found_root = reparsed.trailer.get(b"Root").and_then(|root| root.as_reference()).ok();
    if expected_root != found_root {
        return Err(Error::Verification(format!(
            "catalog reference {expected_root:?} became {found_root:?}"
        )));
    }
    debug!("re-parsed output holds the same {} objects", found.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;
    use crate::{Object, dictionary};

    fn document() -> Document {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog", "Pages" => (2, 0) }.into());
        doc.objects.insert((2, 0), dictionary! { "Type" => "Pages", "Kids" => Vec::<Object>::new(), "Count" => 0 }.into());
        doc.trailer.set("Root", (1, 0));
        doc
    }

    #[test]
    fn written_output_verifies() {
        let doc = document();
        for xref_streams in [false, true] {
            let mut output = Vec::new();
            let summary = Writer::new(&doc).xref_streams(xref_streams).write(&mut output).unwrap();
            verify_output(&output, &summary, &doc, "", true).unwrap();
        }
    }

    #[test]
    fn shifted_offset_is_rejected() {
        let doc = document();
        let mut output = Vec::new();
        let mut summary = Writer::new(&doc).write(&mut output).unwrap();
        summary.xref.insert(2, XrefEntry::Normal { offset: 16, generation: 0 });
        let err = verify_output(&output, &summary, &doc, "", false).unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[test]
    fn missing_object_is_rejected() {
        let doc = document();
        let mut output = Vec::new();
        let summary = Writer::new(&doc).write(&mut output).unwrap();
        let mut expected = doc.clone();
        expected.objects.insert((3, 0), Object::Null);
        let err = verify_output(&output, &summary, &expected, "", true).unwrap_err();
        assert!(err.to_string().contains("missing [3]"));
    }
}
