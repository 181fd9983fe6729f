use std::io::{self, Write};

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Comma-separated output. A field is quoted only when it contains the delimiter,
/// a quote or a line break; quotes inside quoted fields are doubled.
pub struct CsvWriter<W: Write> {
    inner: W,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W) -> Self {
        CsvWriter { inner }
    }

    pub fn write_record<I, S>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = String::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                line.push(DELIMITER);
            }
            push_field(&mut line, field.as_ref());
        }
        line.push('\n');

        self.inner.write_all(line.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn push_field(line: &mut String, field: &str) {
    let needs_quotes = field.contains(|c: char| matches!(c, DELIMITER | QUOTE | '\n' | '\r'));
    if !needs_quotes {
        line.push_str(field);
        return;
    }

    line.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            line.push(QUOTE);
        }
        line.push(c);
    }
    line.push(QUOTE);
}
