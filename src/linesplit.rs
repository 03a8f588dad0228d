//! Turn arbitrary byte chunks into newline-delimited log lines.
//!
//! Ported from `internal/stringlogger/stringlogger.go`. Partial trailing
//! data is buffered until a later `push` completes it; `close` flushes
//! whatever is left, even if empty.

pub struct LineSplitter<F: FnMut(&str)> {
    buffer: String,
    separator: &'static str,
    callback: F,
}

impl<F: FnMut(&str)> LineSplitter<F> {
    pub fn new(callback: F) -> Self {
        Self::with_separator("\n", callback)
    }

    pub fn with_separator(separator: &'static str, callback: F) -> Self {
        Self {
            buffer: String::new(),
            separator,
            callback,
        }
    }

    /// Feeds `bytes` through the splitter, invoking the callback once per
    /// complete line found (including ones completed by this call's
    /// leftover buffer).
    pub fn push(&mut self, bytes: &[u8]) {
        let chunk = String::from_utf8_lossy(bytes);

        if !chunk.contains(self.separator) {
            self.buffer.push_str(&chunk);
            return;
        }

        let mut lines: Vec<&str> = chunk.split(self.separator).collect();
        let last = lines.pop().expect("split always yields at least one item");

        if !self.buffer.is_empty() {
            let mut first_line = std::mem::take(&mut self.buffer);
            first_line.push_str(lines[0]);
            (self.callback)(&first_line);
        } else {
            (self.callback)(lines[0]);
        }

        for line in &lines[1..] {
            (self.callback)(line);
        }

        self.buffer.push_str(last);
    }

    /// Flushes the remaining buffer (even if empty) and consumes the
    /// splitter.
    pub fn close(mut self) {
        (self.callback)(&self.buffer);
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<String> {
        let lines = std::cell::RefCell::new(Vec::new());
        let mut splitter = LineSplitter::new(|line: &str| lines.borrow_mut().push(line.to_string()));
        for chunk in chunks {
            splitter.push(chunk);
        }
        splitter.close();
        lines.into_inner()
    }

    #[test]
    fn single_write_with_trailing_newline() {
        assert_eq!(collect(&[b"a\nb\n"]), vec!["a", "b", ""]);
    }

    #[test]
    fn partial_chunk_is_buffered_until_completed() {
        assert_eq!(collect(&[b"hel", b"lo\nworld"]), vec!["hello", "world"]);
    }

    #[test]
    fn close_on_empty_buffer_emits_empty_line() {
        assert_eq!(collect(&[]), vec![""]);
    }

    #[test]
    fn round_trip_reconstructs_original_with_separators() {
        let original = "line one\nline two\nline three";
        let chunks: Vec<&[u8]> = vec![
            original[0..4].as_bytes(),
            original[4..15].as_bytes(),
            original[15..].as_bytes(),
        ];
        let lines = collect(&chunks);
        assert_eq!(lines.join("\n"), original);
    }

    #[test]
    fn no_separator_at_all_buffers_until_close() {
        assert_eq!(collect(&[b"no newline here"]), vec!["no newline here"]);
    }
}
