//! Small helpers shared by the mqttc crates
//!
//! ## Core Features:
//! - **Duration Conversion**: `"1m30s"`, `"2s"` or `"500ms"` style strings into [`Duration`]
//! - **Byte Size Handling**: human-readable byte size parsing/formatting with [`Bytesize`]
//! - **Serde helpers**: deserializers for both, so configuration files can stay readable
//!
//! ```rust
//! use mqttc_utils::{to_duration, Bytesize};
//!
//! assert_eq!(to_duration("1m30s").as_secs(), 90);
//! assert_eq!(Bytesize::from("1M").as_usize(), 1_048_576);
//! ```

#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use serde::{
    de::{self, Deserializer},
    ser::Serializer,
    Deserialize, Serialize,
};

const BYTESIZE_K: usize = 1024;
const BYTESIZE_M: usize = 1048576;
const BYTESIZE_G: usize = 1073741824;

/// Human-readable byte size representation with parsing/serialization support
///
/// # Example:
/// ```
/// use mqttc_utils::Bytesize;
///
/// let size = Bytesize::from("2G512M");
/// assert_eq!(size.as_usize(), 2_684_354_560);
///
/// let size = Bytesize::from(1024);
/// assert_eq!(size.to_string(), "1K");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Bytesize(pub usize);

impl Bytesize {
    /// Convert to u32, saturating at `u32::MAX`
    #[inline]
    pub fn as_u32(&self) -> u32 {
        u32::try_from(self.0).unwrap_or(u32::MAX)
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl Deref for Bytesize {
    type Target = usize;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<usize> for Bytesize {
    fn from(v: usize) -> Self {
        Bytesize(v)
    }
}

impl From<&str> for Bytesize {
    fn from(v: &str) -> Self {
        Bytesize(to_bytesize(v))
    }
}

impl fmt::Display for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut v = self.0;
        if v == 0 {
            return f.write_str("0B");
        }

        for (unit, size) in [('G', BYTESIZE_G), ('M', BYTESIZE_M), ('K', BYTESIZE_K)] {
            let n = v / size;
            if n > 0 {
                write!(f, "{}{}", n, unit)?;
                v %= size;
            }
        }

        if v > 0 {
            write!(f, "{}B", v)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Bytesize {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytesize {
    #[inline]
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = to_bytesize(&String::deserialize(deserializer)?);
        Ok(Bytesize(v))
    }
}

/// Parse human-readable byte size string to usize
///
/// # Example:
/// ```
/// let bytes = mqttc_utils::to_bytesize("2G512K");
/// assert_eq!(bytes, 2148007936);
///
/// let complex = mqttc_utils::to_bytesize("1G500M256K1024B");
/// assert_eq!(complex, 1598292992);
/// ```
#[inline]
pub fn to_bytesize(text: &str) -> usize {
    let text = text.to_uppercase().replace("GB", "G").replace("MB", "M").replace("KB", "K");
    text.split_inclusive(['G', 'M', 'K', 'B'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().parse::<usize>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'B' => v,
                'K' => v * BYTESIZE_K,
                'M' => v * BYTESIZE_M,
                'G' => v * BYTESIZE_G,
                _ => 0,
            }
        })
        .sum()
}

/// Deserialize Duration from human-readable string format
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    parse_duration(&v).map_err(de::Error::custom)
}

/// Serialize Duration back into the string form accepted by [`deserialize_duration`]
#[inline]
pub fn serialize_duration<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&format!("{}ms", d.as_millis()))
}

/// Convert human-readable duration string to Duration
///
/// Unknown units count as zero. Use [`parse_duration`] to reject them instead.
///
/// # Supported units:
/// - ms: milliseconds
/// - s: seconds
/// - m: minutes
/// - h: hours
/// - d: days
/// - w: weeks
///
/// # Example:
/// ```
/// let duration = mqttc_utils::to_duration("1h30m15s");
/// assert_eq!(duration.as_secs(), 5415);
///
/// let complex = mqttc_utils::to_duration("2w3d12h");
/// assert_eq!(complex.as_secs(), 1512000);
/// ```
#[inline]
pub fn to_duration(text: &str) -> Duration {
    parse_duration_lossy(text, false).unwrap_or_default()
}

/// Strict variant of [`to_duration`]
///
/// A bare number is read as seconds.
///
/// ```
/// assert_eq!(mqttc_utils::parse_duration("2s").unwrap().as_secs(), 2);
/// assert_eq!(mqttc_utils::parse_duration("15").unwrap().as_secs(), 15);
/// assert!(mqttc_utils::parse_duration("2x").is_err());
/// ```
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    parse_duration_lossy(text, true)
}

fn parse_duration_lossy(text: &str, strict: bool) -> Result<Duration, String> {
    let text = text.to_lowercase().replace("ms", "Y");
    let mut ms: u64 = 0;
    for x in text.split_inclusive(['s', 'm', 'h', 'd', 'w', 'Y']) {
        let mut chars = x.chars();
        let u = match chars.nth_back(0) {
            None => continue,
            Some(u) => u,
        };
        let v = match chars.as_str().trim().parse::<u64>() {
            Err(_e) if strict => return Err(format!("invalid duration, {:?}", text.replace('Y', "ms"))),
            Err(_e) => continue,
            Ok(v) => v,
        };
        ms += match u {
            'Y' => v,
            's' => v * 1000,
            'm' => v * 60000,
            'h' => v * 3600000,
            'd' => v * 86400000,
            'w' => v * 604800000,
            _ if strict => return Err(format!("invalid duration unit, {:?}", u)),
            _ => 0,
        };
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_duration() {
        assert_eq!(to_duration("2s"), Duration::from_secs(2));
        assert_eq!(to_duration("500ms"), Duration::from_millis(500));
        assert_eq!(to_duration("1m30s"), Duration::from_secs(90));
        assert_eq!(to_duration("1h"), Duration::from_secs(3600));
        assert_eq!(to_duration("abc"), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1m5s").unwrap(), Duration::from_secs(65));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_bytesize() {
        assert_eq!(Bytesize::from("256K").as_usize(), 256 * 1024);
        assert_eq!(Bytesize(3145728).to_string(), "3M");
        assert_eq!(Bytesize(2148532224).to_string(), "2G1M");
        assert_eq!(Bytesize(1025).to_string(), "1K1B");
        assert_eq!(Bytesize(usize::MAX).as_u32(), u32::MAX);
    }

    #[test]
    fn test_deserialize_duration() {
        #[derive(Deserialize)]
        struct Cfg {
            #[serde(deserialize_with = "deserialize_duration")]
            keepalive: Duration,
        }
        let cfg: Cfg = serde_json::from_str(r#"{"keepalive": "2s"}"#).unwrap();
        assert_eq!(cfg.keepalive, Duration::from_secs(2));
        assert!(serde_json::from_str::<Cfg>(r#"{"keepalive": "2q"}"#).is_err());
    }
}
