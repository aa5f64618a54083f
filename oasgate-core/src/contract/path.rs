//! Path templates (`/users/{id}`) and request path matching.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `{name}`, optionally with literal text around it (`{name}.json`).
    Param {
        prefix: String,
        name: String,
        suffix: String,
    },
}

/// A parsed OpenAPI path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template. Returns a reason when it is not usable.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("path template '{raw}' must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in split_segments(raw) {
            segments.push(parse_segment(part)?);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Number of literal segments, the match specificity.
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Matches request path segments, returning captured parameters.
    pub fn matches(&self, segments: &[&str]) -> Option<Vec<(String, String)>> {
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (template, actual) in self.segments.iter().zip(segments) {
            match template {
                Segment::Literal(lit) => {
                    if lit.as_str() != *actual {
                        return None;
                    }
                }
                Segment::Param {
                    prefix,
                    name,
                    suffix,
                } => {
                    let value = actual.strip_prefix(prefix.as_str())?;
                    let value = value.strip_suffix(suffix.as_str())?;
                    if value.is_empty() {
                        return None;
                    }
                    captures.push((name.clone(), value.to_string()));
                }
            }
        }
        Some(captures)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a path into segments, ignoring one trailing `/`.
///
/// The root path has no segments.
pub(crate) fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn parse_segment(part: &str) -> Result<Segment, String> {
    let Some(open) = part.find('{') else {
        if part.contains('}') {
            return Err(format!("unbalanced '}}' in segment '{part}'"));
        }
        return Ok(Segment::Literal(part.to_string()));
    };

    let close = part[open..]
        .find('}')
        .map(|i| open + i)
        .ok_or_else(|| format!("unbalanced '{{' in segment '{part}'"))?;

    let name = &part[open + 1..close];
    let suffix = &part[close + 1..];
    if name.is_empty() {
        return Err(format!("empty parameter name in segment '{part}'"));
    }
    if suffix.contains('{') || suffix.contains('}') {
        return Err(format!("only one parameter per segment is supported: '{part}'"));
    }

    Ok(Segment::Param {
        prefix: part[..open].to_string(),
        name: name.to_string(),
        suffix: suffix.to_string(),
    })
}
