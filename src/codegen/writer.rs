//! Indentation-aware line buffer shared by both emitters.

pub struct SourceWriter {
    out: String,
    depth: usize,
    unit: &'static str,
}

impl SourceWriter {
    pub fn new(unit: &'static str) -> Self {
        Self { out: String::new(), depth: 0, unit }
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
        self
    }

    /// Emit several lines at the current depth; embedded newlines are
    /// re-indented.
    pub fn lines(&mut self, text: impl AsRef<str>) -> &mut Self {
        for line in text.as_ref().lines() {
            self.line(line);
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
        self
    }

    /// Emit `header` and indent everything until the matching [`close`].
    ///
    /// [`close`]: SourceWriter::close
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(header);
        self.depth += 1;
        self
    }

    pub fn close(&mut self, footer: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(footer)
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_and_blank_lines() {
        let mut w = SourceWriter::new("    ");
        w.open("fn main() {");
        w.lines("let a = 1;\nlet b = 2;");
        w.blank().blank();
        w.line("");
        w.close("}");
        assert_eq!(w.into_string(), "fn main() {\n    let a = 1;\n    let b = 2;\n\n\n}\n");
    }
}
