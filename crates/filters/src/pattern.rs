//! crates/filters/src/pattern.rs
//!
//! A single compiled pattern.
//!
//! Specification syntax, comma-separated prefixes before the pattern body:
//!
//! ```text
//! [group:NAME,][take,|ignore,][dironly,][prop:KEY=VALUE,]...BODY
//! ```
//!
//! where `BODY` is one of
//!
//! ```text
//! ./shell/glob/**          anchored shell glob ( *, ?, **, [...] )
//! regex:^etc/.*\.bak$      verbatim regular expression
//! mode:OCTAL_AND:OCTAL_CMP matches (mode & AND) == CMP
//! device:[<|<=|>|>=]MAJOR[:MINOR]
//! inode:DEV:INO            one specific hardlink target
//! ```

use metadata::StatInfo;
use regex::Regex;
use thiserror::Error;

/// Errors from pattern compilation.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern body is missing entirely.
    #[error("empty pattern")]
    Empty,
    /// A regex body failed to compile.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    /// A numeric field did not parse.
    #[error("invalid number in \"{0}\"")]
    Number(String),
    /// An unknown prefix was used.
    #[error("unknown pattern element \"{0}\"")]
    UnknownElement(String),
}

/// Whether a match keeps or drops the entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Matching entries are not versioned.
    #[default]
    Ignore,
    /// Matching entries are versioned even if a later pattern ignores
    /// them.
    Take,
}

/// Device comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevCompare {
    /// Strictly less than the given device.
    Less,
    /// Less than or equal.
    LessEq,
    /// Exactly equal.
    Equal,
    /// Greater than or equal.
    GreaterEq,
    /// Strictly greater.
    Greater,
}

/// The matching core of a pattern.
#[derive(Clone, Debug)]
pub enum Matcher {
    /// Anchored path expression (from a shell glob or verbatim regex).
    Path(Regex),
    /// `(mode & mask) == value`.
    Mode {
        /// Bits that participate in the comparison.
        mask: u32,
        /// Expected masked value.
        value: u32,
    },
    /// Device-number comparison for device nodes.
    Device {
        /// Comparison operator.
        cmp: DevCompare,
        /// Major number compared against.
        major: u32,
        /// Optional minor number; absent means "any minor".
        minor: Option<u32>,
    },
    /// One specific `(device, inode)` pair.
    Inode {
        /// Host filesystem device.
        dev: u64,
        /// Inode number.
        ino: u64,
    },
}

/// A compiled pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    spec: String,
    matcher: Matcher,
    polarity: Polarity,
    group: Option<String>,
    dir_only: bool,
    auto_props: Vec<(String, String)>,
}

impl Pattern {
    /// Compiles a pattern specification.
    pub fn parse(spec: &str) -> Result<Self, PatternError> {
        let mut rest = spec;
        let mut polarity = None;
        let mut group = None;
        let mut dir_only = false;
        let mut auto_props = Vec::new();

        loop {
            if let Some(tail) = rest.strip_prefix("take,") {
                polarity = Some(Polarity::Take);
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("ignore,") {
                polarity = Some(Polarity::Ignore);
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("dironly,") {
                dir_only = true;
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("group:") {
                let (name, tail) = tail
                    .split_once(',')
                    .ok_or_else(|| PatternError::UnknownElement(tail.to_owned()))?;
                group = Some(name.to_owned());
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("prop:") {
                let (kv, tail) = tail
                    .split_once(',')
                    .ok_or_else(|| PatternError::UnknownElement(tail.to_owned()))?;
                let (key, value) = kv.split_once('=').unwrap_or((kv, ""));
                auto_props.push((key.to_owned(), value.to_owned()));
                rest = tail;
            } else {
                break;
            }
        }

        if rest.is_empty() {
            return Err(PatternError::Empty);
        }

        // The group named "ignore" drops entries; any other named group
        // takes them.
        let polarity = polarity.unwrap_or(match group.as_deref() {
            Some("ignore") | None => Polarity::Ignore,
            Some(_) => Polarity::Take,
        });

        let matcher = Self::parse_body(rest)?;
        Ok(Self {
            spec: spec.to_owned(),
            matcher,
            polarity,
            group,
            dir_only,
            auto_props,
        })
    }

    fn parse_body(body: &str) -> Result<Matcher, PatternError> {
        if let Some(re) = body.strip_prefix("regex:") {
            return Ok(Matcher::Path(Regex::new(&format!("^(?:{re})$"))?));
        }
        if let Some(spec) = body.strip_prefix("mode:") {
            let (mask, value) = spec
                .split_once(':')
                .ok_or_else(|| PatternError::Number(body.to_owned()))?;
            let parse = |s: &str| {
                u32::from_str_radix(s.trim_start_matches("0o"), 8)
                    .map_err(|_| PatternError::Number(body.to_owned()))
            };
            return Ok(Matcher::Mode {
                mask: parse(mask)?,
                value: parse(value)?,
            });
        }
        if let Some(spec) = body.strip_prefix("device:") {
            return Self::parse_device(spec, body);
        }
        if let Some(spec) = body.strip_prefix("inode:") {
            let (dev, ino) = spec
                .split_once(':')
                .ok_or_else(|| PatternError::Number(body.to_owned()))?;
            let dev = dev
                .parse()
                .map_err(|_| PatternError::Number(body.to_owned()))?;
            let ino = ino
                .parse()
                .map_err(|_| PatternError::Number(body.to_owned()))?;
            return Ok(Matcher::Inode { dev, ino });
        }
        Ok(Matcher::Path(glob_to_regex(body)?))
    }

    fn parse_device(spec: &str, body: &str) -> Result<Matcher, PatternError> {
        let (cmp, spec) = if let Some(s) = spec.strip_prefix("<=") {
            (DevCompare::LessEq, s)
        } else if let Some(s) = spec.strip_prefix(">=") {
            (DevCompare::GreaterEq, s)
        } else if let Some(s) = spec.strip_prefix('<') {
            (DevCompare::Less, s)
        } else if let Some(s) = spec.strip_prefix('>') {
            (DevCompare::Greater, s)
        } else {
            (DevCompare::Equal, spec)
        };
        let (major, minor) = match spec.split_once(':') {
            Some((major, minor)) => (
                major
                    .parse()
                    .map_err(|_| PatternError::Number(body.to_owned()))?,
                Some(
                    minor
                        .parse()
                        .map_err(|_| PatternError::Number(body.to_owned()))?,
                ),
            ),
            None => (
                spec.parse()
                    .map_err(|_| PatternError::Number(body.to_owned()))?,
                None,
            ),
        };
        Ok(Matcher::Device { cmp, major, minor })
    }

    /// The original specification text.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Keep or drop on match.
    #[must_use]
    pub const fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Group name, if the pattern belongs to one.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Auto-props applied to entries this pattern takes.
    #[must_use]
    pub fn auto_props(&self) -> &[(String, String)] {
        &self.auto_props
    }

    /// Does this pattern match the entry at the WC-relative `rel_path`?
    #[must_use]
    pub fn matches(&self, rel_path: &str, st: &StatInfo) -> bool {
        if self.dir_only && !st.is_dir() {
            return false;
        }
        match &self.matcher {
            Matcher::Path(re) => re.is_match(rel_path),
            Matcher::Mode { mask, value } => (st.mode & mask) == *value,
            Matcher::Device { cmp, major, minor } => {
                if !st.kind().is_device() {
                    return false;
                }
                let (dev_major, dev_minor) = st.rdev_split();
                let ord = dev_major
                    .cmp(major)
                    .then(minor.map_or(std::cmp::Ordering::Equal, |m| dev_minor.cmp(&m)));
                match cmp {
                    DevCompare::Less => ord.is_lt(),
                    DevCompare::LessEq => ord.is_le(),
                    DevCompare::Equal => ord.is_eq(),
                    DevCompare::GreaterEq => ord.is_ge(),
                    DevCompare::Greater => ord.is_gt(),
                }
            }
            Matcher::Inode { dev, ino } => st.dev == *dev && st.ino == *ino,
        }
    }
}

/// Translates a shell glob into an anchored regex. `*` and `?` do not
/// cross `/`; `**` does. A leading `./` is the WC root and is dropped.
fn glob_to_regex(glob: &str) -> Result<Regex, PatternError> {
    let glob = glob.strip_prefix("./").unwrap_or(glob);
    let mut re = String::with_capacity(glob.len() + 16);
    re.push('^');

    let bytes = glob.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    re.push_str(".*");
                    i += 2;
                    // collapse "**/" so it also matches zero components
                    if bytes.get(i) == Some(&b'/') {
                        re.push_str("/?");
                        i += 1;
                    }
                } else {
                    re.push_str("[^/]*");
                    i += 1;
                }
            }
            b'?' => {
                re.push_str("[^/]");
                i += 1;
            }
            b'[' => {
                let close = bytes[i + 1..].iter().position(|&b| b == b']');
                if let Some(off) = close {
                    re.push_str(&glob[i..=i + 1 + off]);
                    i += off + 2;
                } else {
                    re.push_str("\\[");
                    i += 1;
                }
            }
            c => {
                if c.is_ascii_alphanumeric() || c == b'/' || c == b'_' || c == b'-' {
                    re.push(c as char);
                } else {
                    re.push('\\');
                    re.push(c as char);
                }
                i += 1;
            }
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}
