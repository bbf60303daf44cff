//! The `clean` entry point: parse, analyze, compact, serialize, verify, flush.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::analyzer::{RetainSet, live_objects};
use crate::budget::MemoryBudget;
use crate::error::CleanError;
use crate::options::CleanOptions;
use crate::rewriter::compact;
use crate::verify::verify_output;
use crate::writer::Writer;
use crate::Document;

/// Stages of one clean operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Parsing,
    ParseFailed,
    Analyzing,
    Rewriting,
    Serializing,
    WriteFailed,
    Done,
}

struct Pipeline {
    phase: Phase,
}

impl Pipeline {
    fn new() -> Pipeline {
        Pipeline { phase: Phase::Start }
    }

    fn enter(&mut self, next: Phase) {
        debug!("clean: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Clean the document in `input` and write the result to `output`.
///
/// `password` opens an encrypted input; pass an empty string when none was supplied. Objects
/// whose numbers are in `retain` survive even when nothing references them. Nothing is written
/// to `output` unless the serialized document passed verification.
pub fn clean<W: Write>(
    input: &[u8], output: &mut W, password: &str, retain: &RetainSet, options: &CleanOptions,
) -> Result<(), CleanError> {
    run(&mut Pipeline::new(), input, output, password, retain, options)
}

fn run<W: Write>(
    pipeline: &mut Pipeline, input: &[u8], output: &mut W, password: &str, retain: &RetainSet,
    options: &CleanOptions,
) -> Result<(), CleanError> {
    pipeline.enter(Phase::Parsing);
    let budget = Arc::new(MemoryBudget::new(options.memory_limit));
    let document = match Document::load_mem_with_budget(input, password, budget) {
        Ok(document) => document,
        Err(err) => {
            pipeline.enter(Phase::ParseFailed);
            return Err(CleanError::from(err).with_password(password));
        }
    };

    pipeline.enter(Phase::Analyzing);
    let live = live_objects(&document, retain);
    debug!("{} of {} objects are live", live.len(), document.objects.len());

    pipeline.enter(Phase::Rewriting);
    let compacted = compact(&document, &live, options)?;
    drop(document);

    pipeline.enter(Phase::Serializing);
    let mut buffer = Vec::new();
    let summary = Writer::new(&compacted)
        .xref_streams(options.use_xref_streams)
        .encryption(options.reencrypt.as_ref())
        .write(&mut buffer)?;
    let output_password = options.reencrypt.as_ref().map_or("", |spec| spec.user_password.as_str());
    verify_output(&buffer, &summary, &compacted, output_password, options.verify_reparse)?;

    if let Err(err) = output.write_all(&buffer).and_then(|()| output.flush()) {
        pipeline.enter(Phase::WriteFailed);
        return Err(CleanError::WriteFailed(err));
    }
    pipeline.enter(Phase::Done);
    info!("wrote {} objects in {} bytes", compacted.objects.len(), buffer.len());
    Ok(())
}

/// Clean the file at `input_path` into `output_path`. The output file is only created when
/// cleaning succeeds.
pub fn clean_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P, output_path: Q, password: &str, retain: &RetainSet, options: &CleanOptions,
) -> Result<(), CleanError> {
    let input = fs::read(input_path.as_ref()).map_err(CleanError::ReadFailed)?;
    let mut output = Vec::new();
    clean(&input, &mut output, password, retain, options)?;
    fs::write(output_path.as_ref(), output).map_err(CleanError::WriteFailed)
}
