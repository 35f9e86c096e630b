/// External port range expressions
///
/// **Accepted forms:**
/// - `30000-30100` (inclusive on both ends)
/// - `30000` (a single port)
/// - `[30000;30100]` with reversed brackets excluding a bound:
///   `]30000;30100]`, `[30000;30100[`, `]30000;30100[` (`,` works as separator too)
///
/// Ports are restricted to 1..=65535. Port 0 means "any port" to the OS
/// and is never a valid external port for a fixture.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("empty interval expression")]
    Empty,

    #[error("invalid bound '{0}' (expected a port number between 1 and 65535)")]
    InvalidBound(String),

    #[error("unbalanced brackets in '{0}'")]
    Unbalanced(String),

    #[error("interval '{0}' contains no port")]
    EmptyRange(String),
}

/// Inclusive range of external ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        self.min <= port && port <= self.max
    }

    /// Number of ports in the range
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.max - self.min) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.min..=self.max
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

fn parse_bound(token: &str) -> Result<u32, IntervalError> {
    let token = token.trim();
    match token.parse::<u32>() {
        Ok(value) if (1..=65535).contains(&value) => Ok(value),
        _ => Err(IntervalError::InvalidBound(token.to_string())),
    }
}

/// Parse a port range expression into an inclusive [`PortRange`]
pub fn parse(text: &str) -> Result<PortRange, IntervalError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IntervalError::Empty);
    }

    let (min, max) = match trimmed.chars().next() {
        Some('[') | Some(']') => parse_bracketed(trimmed)?,
        _ => match trimmed.split_once('-') {
            Some((low, high)) => (parse_bound(low)?, parse_bound(high)?),
            None => {
                let port = parse_bound(trimmed)?;
                (port, port)
            }
        },
    };

    if min > max || max > 65535 || min == 0 {
        return Err(IntervalError::EmptyRange(trimmed.to_string()));
    }

    Ok(PortRange {
        min: min as u16,
        max: max as u16,
    })
}

// `[a;b]` style: an outward-facing bracket excludes the bound
fn parse_bracketed(text: &str) -> Result<(u32, u32), IntervalError> {
    let unbalanced = || IntervalError::Unbalanced(text.to_string());

    let open = text.chars().next().ok_or_else(unbalanced)?;
    let close = text.chars().last().ok_or_else(unbalanced)?;
    if text.len() < 2 || !matches!(close, '[' | ']') {
        return Err(unbalanced());
    }

    let inner = &text[1..text.len() - 1];
    let (low, high) = inner
        .split_once(';')
        .or_else(|| inner.split_once(','))
        .ok_or_else(unbalanced)?;

    let mut min = parse_bound(low)?;
    let mut max = parse_bound(high)?;
    if open == ']' {
        min += 1;
    }
    if close == '[' {
        max = max.saturating_sub(1);
    }
    Ok((min, max))
}
