//! Path-pattern to MIME type mapping.

use regex::Regex;

/// Ordered `(pattern, mime)` pairs; the first whole-path match wins.
#[derive(Debug, Default)]
pub struct ContentTypeMap {
    rules: Vec<(Regex, String)>,
}

impl ContentTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: &str, mime: &str) -> Result<(), regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        self.rules.push((regex, mime.to_string()));
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(path))
            .map(|(_, mime)| mime.as_str())
    }
}
