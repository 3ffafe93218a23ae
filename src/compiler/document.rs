//! Typed configuration sections and their serialization.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Global,
    Defaults,
    Listen,
    Frontend,
    Backend,
}

impl SectionKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            SectionKind::Global => "global",
            SectionKind::Defaults => "defaults",
            SectionKind::Listen => "listen",
            SectionKind::Frontend => "frontend",
            SectionKind::Backend => "backend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Directive(String),
    Comment(String),
    Blank,
}

/// One `global` / `defaults` / `listen` / `frontend` / `backend` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    kind: SectionKind,
    name: Option<String>,
    header: Vec<String>,
    lines: Vec<Line>,
}

impl Section {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            name: None,
            header: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn named(kind: SectionKind, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(kind)
        }
    }

    /// Comment emitted above the section keyword.
    pub fn header_comment(mut self, text: impl Into<String>) -> Self {
        self.header.push(text.into());
        self
    }

    pub fn directive(mut self, text: impl Into<String>) -> Self {
        self.push(text);
        self
    }

    pub fn directives<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines
            .extend(items.into_iter().map(|s| Line::Directive(s.into())));
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.lines.push(Line::Comment(text.into()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(Line::Blank);
        self
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.lines.push(Line::Directive(text.into()));
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for text in &self.header {
            writeln!(f, "# {}", text)?;
        }
        match &self.name {
            Some(name) => writeln!(f, "{} {}", self.kind.keyword(), name)?,
            None => writeln!(f, "{}", self.kind.keyword())?,
        }
        for line in &self.lines {
            match line {
                Line::Directive(text) => writeln!(f, "    {}", text)?,
                Line::Comment(text) => writeln!(f, "    # {}", text)?,
                Line::Blank => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Ordered list of sections rendered with one blank line between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    preamble: Vec<String>,
    sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comment lines at the very top of the file.
    pub fn preamble(mut self, text: impl Into<String>) -> Self {
        self.preamble.push(text.into());
        self
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn count(&self, kind: SectionKind) -> usize {
        self.sections.iter().filter(|s| s.kind == kind).count()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for text in &self.preamble {
            writeln!(f, "# {}", text)?;
        }
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 || !self.preamble.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{}", section)?;
        }
        Ok(())
    }
}
