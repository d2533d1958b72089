//! Line-oriented INI reader.
//!
//! Accepts `key = value` and `key: value`, full-line and inline `;`/`#`
//! comments (inline ones must follow whitespace), and lowercases section
//! names and keys. Duplicates are errors rather than silently merged.

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Section {
    pub name: String,
    /// 1-based line of the header.
    pub line: usize,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Document {
    pub sections: Vec<Section>,
}

impl Document {
    /// Parse `text`; the error is a human-readable reason with a line number.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut doc = Document::default();

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = strip_comment(raw.trim_start()).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(inner) = line.strip_prefix('[') {
                let name = inner
                    .strip_suffix(']')
                    .ok_or_else(|| format!("line {lineno}: unterminated section header"))?
                    .trim()
                    .to_ascii_lowercase();
                if name.is_empty() {
                    return Err(format!("line {lineno}: empty section name"));
                }
                if let Some(prev) = doc.section(&name) {
                    return Err(format!(
                        "line {lineno}: duplicate section [{name}] (first at line {})",
                        prev.line
                    ));
                }
                doc.sections.push(Section {
                    name,
                    line: lineno,
                    entries: Vec::new(),
                });
                continue;
            }

            let split = line
                .find(['=', ':'])
                .ok_or_else(|| format!("line {lineno}: expected `key = value`, got `{line}`"))?;
            let key = line[..split].trim().to_ascii_lowercase();
            let value = line[split + 1..].trim().to_string();
            if key.is_empty() {
                return Err(format!("line {lineno}: missing key before `{}`", &line[split..=split]));
            }

            let section = doc
                .sections
                .last_mut()
                .ok_or_else(|| format!("line {lineno}: `{key}` outside any section"))?;
            if section.get(&key).is_some() {
                return Err(format!(
                    "line {lineno}: duplicate key `{key}` in [{}]",
                    section.name
                ));
            }
            section.entries.push((key, value));
        }

        Ok(doc)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn is_comment_at(s: &str, idx: usize) -> bool {
    let before = s[..idx].chars().next_back();
    before.is_none_or(char::is_whitespace)
}

fn strip_comment(line: &str) -> &str {
    for (idx, c) in line.char_indices() {
        if (c == ';' || c == '#') && is_comment_at(line, idx) {
            return &line[..idx];
        }
    }
    line
}

/// Whether `value` survives a write/read cycle unchanged.
pub(crate) fn is_safe_value(value: &str) -> bool {
    value == value.trim()
        && !value.contains(['\n', '\r'])
        && strip_comment(value).len() == value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sections_keys_and_comments() {
        let doc = Document::parse(
            "; header comment\n\
             [Geometry]\n\
             Count: 3   ; inline\n\
             name = tool#1\n\
             \n\
             # another\n\
             [fiducial0]\n\
             x=1.5\n",
        )
        .unwrap();
        assert_eq!(doc.sections.len(), 2);
        let geometry = doc.section("geometry").unwrap();
        assert_eq!(geometry.line, 2);
        assert_eq!(geometry.get("count"), Some("3"));
        assert_eq!(geometry.get("name"), Some("tool#1"));
        assert_eq!(doc.section("fiducial0").unwrap().get("x"), Some("1.5"));
    }

    #[test]
    fn rejects_entries_outside_sections() {
        let err = Document::parse("count = 3\n").unwrap_err();
        assert!(err.contains("line 1"), "{err}");
    }

    #[test]
    fn rejects_duplicates() {
        let err = Document::parse("[a]\nx = 1\nX = 2\n").unwrap_err();
        assert!(err.contains("duplicate key `x`"), "{err}");
        let err = Document::parse("[a]\n[A]\n").unwrap_err();
        assert!(err.contains("duplicate section [a]"), "{err}");
    }

    #[test]
    fn rejects_unparsable_lines() {
        let err = Document::parse("[a]\njust words\n").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn safe_values() {
        assert!(is_safe_value("probe#2"));
        assert!(!is_safe_value("probe ;2"));
        assert!(!is_safe_value(" padded"));
        assert!(!is_safe_value("two\nlines"));
    }
}
