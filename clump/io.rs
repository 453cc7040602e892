// ========================================================================================
//
//                           Line-oriented text input
//
// ========================================================================================
//
// Every input of the tool (summary statistics, link graphs, coverage tables) is a
// delimited text file, optionally gzip-compressed. This module hides the
// compression and hands out one line at a time from a reused buffer.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// A source of text lines with trailing `\n` / `\r\n` removed.
pub trait TextSource: Send {
    /// The next line, or `None` at end of input. The slice is only valid until the
    /// next call.
    fn next_line(&mut self) -> io::Result<Option<&str>>;
}

struct BufferedTextSource {
    reader: BufReader<Box<dyn Read + Send>>,
    line: String,
}

impl TextSource for BufferedTextSource {
    fn next_line(&mut self) -> io::Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        if self.line.ends_with('\n') {
            self.line.pop();
        }
        if self.line.ends_with('\r') {
            self.line.pop();
        }
        Ok(Some(&self.line))
    }
}

/// Opens a local text file, decompressing it on the fly when the name ends in `.gz`.
pub fn open_text_source(path: &Path) -> io::Result<Box<dyn TextSource>> {
    let file = File::open(path)?;
    let inner: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufferedTextSource {
        reader: BufReader::with_capacity(1 << 20, inner),
        line: String::with_capacity(256),
    }))
}
