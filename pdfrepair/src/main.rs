use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use pdfclean::{CleanOptions, EncryptionAlgorithm, EncryptionSpec, RetainSet, clean_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    #[value(name = "rc4-128")]
    Rc4_128,
    #[value(name = "aes-128")]
    Aes128,
    #[value(name = "aes-256")]
    Aes256,
}

impl From<Algorithm> for EncryptionAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Rc4_128 => EncryptionAlgorithm::Rc4_128,
            Algorithm::Aes128 => EncryptionAlgorithm::Aes128,
            Algorithm::Aes256 => EncryptionAlgorithm::Aes256,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Repair PDF files: drop unreferenced objects, renumber densely and rebuild the cross-reference data.",
    arg_required_else_help = true
)]
struct Args {
    /// A PDF file, or a directory whose *.pdf files are all repaired.
    input: PathBuf,

    /// Output file or directory. Defaults to the input name with a `_repaired` suffix.
    output: Option<PathBuf>,

    /// Password for encrypted input.
    #[clap(long, default_value_t = String::from(""))]
    password: String,

    /// Object numbers to keep even when unreferenced, e.g. `--retain 7,42`.
    #[clap(long, value_delimiter = ',')]
    retain: Vec<u32>,

    /// Re-encode streams with FlateDecode where it makes them smaller.
    #[clap(long)]
    compress: bool,

    /// Store decodable streams without filters.
    #[clap(long, conflicts_with = "compress")]
    decompress: bool,

    /// Write a cross-reference stream instead of a classic table.
    #[clap(long)]
    xref_streams: bool,

    /// Encrypt the output with the given algorithm.
    #[clap(long, value_enum)]
    encrypt: Option<Algorithm>,

    /// User password of the encrypted output.
    #[clap(long, requires = "encrypt")]
    user_password: Option<String>,

    /// Owner password of the encrypted output. Defaults to the user password.
    #[clap(long, requires = "encrypt")]
    owner_password: Option<String>,

    /// Abort a file when its stream payloads need more than this many bytes.
    #[clap(long)]
    memory_limit: Option<usize>,

    /// Skip re-parsing the output before it is written.
    #[clap(long)]
    no_verify: bool,
}

impl Args {
    fn options(&self) -> CleanOptions {
        let mut builder = CleanOptions::builder()
            .compress_streams(self.compress)
            .decompress_streams(self.decompress)
            .use_xref_streams(self.xref_streams)
            .verify_reparse(!self.no_verify);
        if let Some(algorithm) = self.encrypt {
            let mut spec = EncryptionSpec::new(self.user_password.clone().unwrap_or_default(), algorithm.into());
            if let Some(owner) = &self.owner_password {
                spec = spec.with_owner_password(owner.clone());
            }
            builder = builder.reencrypt(spec);
        }
        if let Some(limit) = self.memory_limit {
            builder = builder.memory_limit(limit);
        }
        builder.build()
    }

    fn output(&self) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => default_output(&self.input),
        }
    }
}

/// `dir` becomes `dir_repaired`; `file.pdf` becomes `file_repaired.pdf`.
fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str()).to_string_lossy();
    let name = match input.extension() {
        Some(extension) if input.is_file() => format!("{stem}_repaired.{}", extension.to_string_lossy()),
        _ => format!("{}_repaired", input.file_name().unwrap_or(input.as_os_str()).to_string_lossy()),
    };
    input.with_file_name(name)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

/// Every PDF file below `dir`, sorted.
fn collect_pdfs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_pdf(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn repair(input: &Path, output: &Path, args: &Args, retain: &RetainSet, options: &CleanOptions) -> bool {
    debug!("repairing {} into {}", input.display(), output.display());
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(parent) {
            error!("cannot create {}: {err}", parent.display());
            return false;
        }
    }
    match clean_file(input, output, &args.password, retain, options) {
        Ok(()) => {
            println!("Repaired {} -> {}", input.display(), output.display());
            true
        }
        Err(err) => {
            eprintln!("Failed to repair {}: {err}", input.display());
            false
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let options = args.options();
    let retain: RetainSet = args.retain.iter().copied().collect();
    let output = args.output();

    if args.input.is_dir() {
        let files = match collect_pdfs(&args.input) {
            Ok(files) => files,
            Err(err) => {
                eprintln!("Cannot read directory {}: {err}", args.input.display());
                return ExitCode::FAILURE;
            }
        };
        info!("found {} PDF files under {}", files.len(), args.input.display());
        let mut failures = 0;
        for file in &files {
            let relative = file.strip_prefix(&args.input).unwrap_or(file);
            if !repair(file, &output.join(relative), &args, &retain, &options) {
                failures += 1;
            }
        }
        println!("{} of {} files repaired", files.len() - failures, files.len());
        if failures > 0 {
            return ExitCode::FAILURE;
        }
        ExitCode::SUCCESS
    } else if repair(&args.input, &output, &args, &retain, &options) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::parse_from([
            "pdfrepair",
            "in.pdf",
            "--retain",
            "7,42",
            "--compress",
            "--xref-streams",
            "--encrypt",
            "aes-256",
            "--user-password",
            "secret",
            "--memory-limit",
            "1048576",
        ]);
        assert_eq!(args.retain, vec![7, 42]);
        let options = args.options();
        assert!(options.compress_streams && options.use_xref_streams && options.verify_reparse);
        let spec = options.reencrypt.unwrap();
        assert_eq!(spec.algorithm, EncryptionAlgorithm::Aes256);
        assert_eq!(spec.user_password, "secret");
        assert_eq!(options.memory_limit, Some(1 << 20));
    }

    #[test]
    fn compress_conflicts_with_decompress() {
        assert!(Args::try_parse_from(["pdfrepair", "in.pdf", "--compress", "--decompress"]).is_err());
    }

    #[test]
    fn default_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF-1.4\n").unwrap();
        assert_eq!(default_output(&file), dir.path().join("report_repaired.pdf"));

        let sub = dir.path().join("batch");
        fs::create_dir(&sub).unwrap();
        assert_eq!(default_output(&sub), dir.path().join("batch_repaired"));
    }

    #[test]
    fn collects_nested_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.PDF"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("nested").join("b.pdf"), b"").unwrap();
        let files = collect_pdfs(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.PDF"), dir.path().join("nested").join("b.pdf")]);
    }
}
