//! Per-host path matching with literal, `:param` and trailing `*catchall`
//! segments.
//!
//! Each registered pattern is split into segments. At every position a
//! literal outranks a parameter, which outranks a catch-all; the first
//! differing position decides between two candidates. Two patterns with
//! the same shape (parameter names ignored) cannot both be registered.

use std::cmp::Ordering;

use super::RouterError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    const fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 3,
            Self::Param(_) => 2,
            Self::CatchAll(_) => 1,
        }
    }

    fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Param(_), Self::Param(_)) | (Self::CatchAll(_), Self::CatchAll(_)) => true,
            _ => false,
        }
    }
}

/// Values captured by `:param` and `*catchall` segments, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Result of [`PathRouter::lookup`].
#[derive(Debug)]
pub struct Lookup<'a, T> {
    pub value: Option<&'a T>,
    pub params: Params,
    /// No match, but the path with its trailing slash toggled would match.
    pub tsr: bool,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    pattern: String,
    segments: Vec<Segment>,
    value: T,
}

#[derive(Debug, Clone)]
pub struct PathRouter<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for PathRouter<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

/// Check a pattern without registering it.
pub fn validate_pattern(pattern: &str) -> Result<(), RouterError> {
    parse(pattern).map(|_| ())
}

fn invalid(pattern: &str, reason: &'static str) -> RouterError {
    RouterError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    }
}

fn parse(pattern: &str) -> Result<Vec<Segment>, RouterError> {
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(invalid(pattern, "must start with '/'"));
    };

    let raw: Vec<&str> = rest.split('/').collect();
    let mut segments = Vec::with_capacity(raw.len());
    for (i, seg) in raw.iter().enumerate() {
        if let Some(name) = seg.strip_prefix(':') {
            if name.is_empty() {
                return Err(invalid(pattern, "parameter without a name"));
            }
            segments.push(Segment::Param(name.to_string()));
        } else if let Some(name) = seg.strip_prefix('*') {
            if name.is_empty() {
                return Err(invalid(pattern, "catch-all without a name"));
            }
            if i + 1 != raw.len() {
                return Err(invalid(pattern, "catch-all must be the last segment"));
            }
            segments.push(Segment::CatchAll(name.to_string()));
        } else {
            segments.push(Segment::Literal((*seg).to_string()));
        }
    }
    Ok(segments)
}

fn match_segments(segments: &[Segment], request: &[&str]) -> Option<Params> {
    let mut params = Vec::new();
    for (i, seg) in segments.iter().enumerate() {
        match seg {
            Segment::Literal(lit) => {
                if request.get(i) != Some(&lit.as_str()) {
                    return None;
                }
            }
            Segment::Param(name) => match request.get(i) {
                Some(value) if !value.is_empty() => {
                    params.push((name.clone(), (*value).to_string()));
                }
                _ => return None,
            },
            Segment::CatchAll(name) => {
                if i >= request.len() {
                    return None;
                }
                params.push((name.clone(), request[i..].join("/")));
                return Some(Params(params));
            }
        }
    }
    (segments.len() == request.len()).then_some(Params(params))
}

fn compare_specificity(a: &[Segment], b: &[Segment]) -> Ordering {
    a.iter()
        .map(Segment::rank)
        .cmp(b.iter().map(Segment::rank))
}

impl<T> PathRouter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: &str, value: T) -> Result<(), RouterError> {
        let segments = parse(pattern)?;

        if let Some(existing) = self.entries.iter().find(|e| {
            e.segments.len() == segments.len()
                && e.segments
                    .iter()
                    .zip(&segments)
                    .all(|(a, b)| a.same_shape(b))
        }) {
            return Err(RouterError::Conflict {
                pattern: pattern.to_string(),
                existing: existing.pattern.clone(),
            });
        }

        self.entries.push(Entry {
            pattern: pattern.to_string(),
            segments,
            value,
        });
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Lookup<'_, T> {
        if let Some((value, params)) = self.find(path) {
            return Lookup {
                value: Some(value),
                params,
                tsr: false,
            };
        }

        let toggled = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
            Some(_) => String::new(),
            None => format!("{path}/"),
        };
        let tsr = !toggled.is_empty() && self.find(&toggled).is_some();

        Lookup {
            value: None,
            params: Params::default(),
            tsr,
        }
    }

    fn find(&self, path: &str) -> Option<(&T, Params)> {
        let request: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();

        let mut best: Option<(&Entry<T>, Params)> = None;
        for entry in &self.entries {
            let Some(params) = match_segments(&entry.segments, &request) else {
                continue;
            };
            let better = best.as_ref().map_or(true, |(current, _)| {
                compare_specificity(&entry.segments, &current.segments) == Ordering::Greater
            });
            if better {
                best = Some((entry, params));
            }
        }
        best.map(|(entry, params)| (&entry.value, params))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
