use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Field separator: either a literal string or any of a set of characters
pub enum Delimiter {
    Str(String),
    Chars(Vec<char>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl<const N: usize> From<&[char; N]> for Delimiter {
    fn from(chars: &[char; N]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl Delimiter {
    /// Split a line into non-empty fields
    fn split<'a>(&'a self, line: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        let words: Box<dyn Iterator<Item = &'a str>> = match self {
            Delimiter::Str(s) => Box::new(line.split(s.as_str())),
            Delimiter::Chars(chars) => Box::new(line.split(chars.as_slice())),
        };
        Box::new(words.map(str::trim).filter(|w| !w.is_empty()))
    }
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;

    match Path::new(input_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not; `stdout` and
///   `stderr` are recognized
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;

    match Path::new(output_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            flate2::Compression::default(),
        )))),
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

///
/// Read a delimited file and parse every field as `T`.
///
/// Lines starting with `#` or `%` are comments. Parsing runs in
/// parallel but the returned rows keep the file order.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - field separator
/// * `skip` - number of non-comment lines to skip (headers)
///
pub fn read_lines_of_types<T>(
    input_file: &str,
    delim: impl Into<Delimiter>,
    skip: Option<usize>,
) -> anyhow::Result<Vec<Vec<T>>>
where
    T: FromStr + Send,
    <T as FromStr>::Err: std::fmt::Display,
{
    let delim: Delimiter = delim.into();
    let buf = open_buf_reader(input_file)?;

    let mut lines: Vec<String> = vec![];
    for line in buf.lines() {
        let line = line?;
        if line.starts_with('#') || line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        lines.push(line);
    }

    let n_skip = skip.unwrap_or(0);
    if lines.len() < n_skip {
        anyhow::bail!("{}: fewer lines than the {} to skip", input_file, n_skip);
    }

    let delim = &delim;
    lines[n_skip..]
        .par_iter()
        .enumerate()
        .map(|(i, line)| {
            delim
                .split(line)
                .map(|w| {
                    w.parse::<T>().map_err(|e| {
                        anyhow::anyhow!(
                            "{}: line {}: cannot parse '{}': {}",
                            input_file,
                            i + n_skip + 1,
                            w,
                            e
                        )
                    })
                })
                .collect::<anyhow::Result<Vec<T>>>()
        })
        .collect()
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow::anyhow!("unexpected error: {}", e));
        }
    }
    buf.flush()?;
    Ok(())
}

///
/// Create the parent directory of a file if needed
/// * `file` - file name
///
pub fn mkdir_parent(file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Suggest a fresh file name in the system temporary directory
/// * `suffix` - suffix of the file name (e.g. `tsv.gz`)
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<PathBuf> {
    let temp_file = tempfile::Builder::new()
        .prefix("matrix-util-")
        .suffix(&format!(".{}", suffix.trim_start_matches('.')))
        .tempfile_in(std::env::temp_dir())?;
    Ok(temp_file.path().to_owned())
}

///
/// Remove a file if it exists
/// * `file` - file name
///
pub fn remove_file(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if path.is_file() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
