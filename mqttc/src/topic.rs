use std::fmt;
use std::str::FromStr;

use crate::ClientError;

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Level {
    Normal(String),
    Metadata(String), // $SYS
    Blank,
    SingleWildcard, // Single level wildcard +
    MultiWildcard,  // Multi-level wildcard #
}

impl Level {
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(*self, Level::SingleWildcard | Level::MultiWildcard)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        match *self {
            Level::Normal(ref s) => !s.starts_with('$') && !s.contains(['+', '#']),
            Level::Metadata(ref s) => s.starts_with('$') && !s.contains(['+', '#']),
            _ => true,
        }
    }
}

impl FromStr for Level {
    type Err = ClientError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, ClientError> {
        match s {
            "+" => Ok(Level::SingleWildcard),
            "#" => Ok(Level::MultiWildcard),
            "" => Ok(Level::Blank),
            _ if s.contains(['+', '#']) => {
                Err(ClientError::InvalidTopic(format!("invalid level `{s}` contains +|#")))
            }
            _ if s.starts_with('$') => Ok(Level::Metadata(String::from(s))),
            _ => Ok(Level::Normal(String::from(s))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Normal(ref s) | Level::Metadata(ref s) => f.write_str(s.as_str()),
            Level::Blank => Ok(()),
            Level::SingleWildcard => f.write_str("+"),
            Level::MultiWildcard => f.write_str("#"),
        }
    }
}

/// A topic name or filter split into its `/` separated levels.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Topic(Vec<Level>);

impl Topic {
    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.0
    }

    #[inline]
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(Level::is_wildcard)
    }

    /// `#` may only be the last level, `$` levels only the first.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0
            .iter()
            .position(|level| !level.is_valid())
            .or_else(|| {
                self.0.iter().enumerate().position(|(pos, level)| match *level {
                    Level::MultiWildcard => pos != self.0.len() - 1,
                    Level::Metadata(_) => pos != 0,
                    _ => false,
                })
            })
            .is_none()
    }
}

impl FromStr for Topic {
    type Err = ClientError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, ClientError> {
        s.split('/').map(Level::from_str).collect::<Result<Vec<_>, _>>().map(Topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in &self.0 {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            level.fmt(f)?;
        }
        Ok(())
    }
}

/// Topic a PUBLISH may carry: non-empty, no wildcards.
pub fn validate_topic_name(topic: &str) -> Result<(), ClientError> {
    if topic.is_empty() {
        return Err(ClientError::InvalidTopic("empty topic".into()));
    }
    let t = Topic::from_str(topic)?;
    if t.has_wildcard() || !t.is_valid() {
        return Err(ClientError::InvalidTopic(format!("`{topic}` is not a valid topic name")));
    }
    Ok(())
}

/// Topic filter for SUBSCRIBE/UNSUBSCRIBE.
pub fn validate_topic_filter(filter: &str) -> Result<(), ClientError> {
    if filter.is_empty() {
        return Err(ClientError::InvalidTopic("empty topic filter".into()));
    }
    if !Topic::from_str(filter)?.is_valid() {
        return Err(ClientError::InvalidTopic(format!("`{filter}` is not a valid topic filter")));
    }
    Ok(())
}
