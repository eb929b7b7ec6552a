//! Route template compilation.
//!
//! A template is literal text with `:name` placeholders. Compilation escapes
//! the literal parts, replaces each placeholder with a single-segment capture
//! group and anchors the result, allowing one optional trailing slash.

use regex::Regex;

use crate::error::PatternError;
use crate::params::Params;

/// Capture used for every named segment.
const SEGMENT_CAPTURE: &str = "([^/]+)";

/// A compiled route template.
///
/// # Example
///
/// ```rust
/// use kanto_router::PathPattern;
///
/// let pattern = PathPattern::compile("/cards/:id").unwrap();
/// assert_eq!(pattern.param_names(), ["id"]);
///
/// let params = pattern.matches("/cards/abc123/").unwrap();
/// assert_eq!(params.get("id"), Some("abc123"));
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl PathPattern {
    /// Compiles a route template.
    ///
    /// The empty template (and `/`) compiles to the root pattern. A `:` that
    /// is not followed by a word character is kept as a literal.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::DuplicateParam`] when a parameter name is used
    /// twice in the same template.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let body = template.strip_suffix('/').unwrap_or(template);

        let mut source = String::with_capacity(body.len() + 16);
        let mut param_names: Vec<String> = Vec::new();
        let mut literal = String::new();
        source.push('^');

        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c == ':' && chars.peek().is_some_and(|next| is_name_char(*next)) {
                let mut name = String::new();
                while let Some(next) = chars.peek().copied().filter(|n| is_name_char(*n)) {
                    name.push(next);
                    chars.next();
                }

                if param_names.contains(&name) {
                    return Err(PatternError::DuplicateParam {
                        name,
                        template: template.to_string(),
                    });
                }

                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(SEGMENT_CAPTURE);
                param_names.push(name);
            } else {
                literal.push(c);
            }
        }

        source.push_str(&regex::escape(&literal));
        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|e| PatternError::Invalid {
            template: template.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            param_names,
        })
    }

    /// Matches a request path against this pattern.
    ///
    /// Returns the extracted parameters in declaration order, with values
    /// percent-decoded. A value that does not decode to valid UTF-8 is
    /// returned as it appeared in the path. `None` means no match.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;

        let params = self
            .param_names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                let raw = captures.get(i + 1)?.as_str();
                Some((name.clone(), decode(raw)))
            })
            .collect();

        Some(params)
    }

    /// Returns `true` if the path matches, without extracting parameters.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Returns the template this pattern was compiled from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the parameter names in declaration order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Returns the generated regular expression.
    #[must_use]
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |v| v.into_owned())
}
