//! crates/repos/src/url.rs
//!
//! The URL list and its two files: the backup-worthy `Urls` configuration
//! and the volatile `revs` current-revision map. Keeping the revisions
//! apart means a commit never rewrites the configuration file.

use base::error::ResultExt;
use base::{Error, ErrorKind, Result, RevNum};
use rustc_hash::FxHashMap;
use std::io::Write;
use waa::{Waa, ext};

/// One repository URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    /// The URL proper.
    pub url: String,
    /// Symbolic name, if the user gave one.
    pub name: Option<String>,
    /// Priority; lower values overlay higher ones.
    pub priority: u32,
    /// Pinned target revision; `None` follows HEAD.
    pub target_rev: Option<RevNum>,
    /// Revision the working copy currently has from this URL.
    pub current_rev: RevNum,
    /// Stable internal id, referenced from entry records.
    pub internal_id: u32,
}

impl Url {
    /// Parses a user specification:
    /// `[name:NAME,][prio:N,][target:REV,]URL`.
    pub fn parse(spec: &str, internal_id: u32) -> Result<Self> {
        let mut name = None;
        let mut priority = 0;
        let mut target_rev = None;
        let mut rest = spec;

        loop {
            if let Some(tail) = rest.strip_prefix("name:") {
                let (value, tail) = tail
                    .split_once(',')
                    .ok_or_else(|| bad_spec(spec, "unterminated name"))?;
                name = Some(value.to_owned());
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("prio:") {
                let (value, tail) = tail
                    .split_once(',')
                    .ok_or_else(|| bad_spec(spec, "unterminated priority"))?;
                priority = value
                    .parse()
                    .map_err(|_| bad_spec(spec, "bad priority"))?;
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("target:") {
                let (value, tail) = tail
                    .split_once(',')
                    .ok_or_else(|| bad_spec(spec, "unterminated target"))?;
                target_rev = Some(value.parse().map_err(|_| bad_spec(spec, "bad target"))?);
                rest = tail;
            } else {
                break;
            }
        }

        if rest.is_empty() {
            return Err(bad_spec(spec, "no URL left"));
        }
        Ok(Self {
            url: rest.to_owned(),
            name,
            priority,
            target_rev,
            current_rev: 0,
            internal_id,
        })
    }
}

fn bad_spec(spec: &str, why: &str) -> Error {
    Error::new(ErrorKind::Io, format!("URL \"{spec}\": {why}"))
}

/// The ordered URL list of one working copy.
#[derive(Clone, Debug, Default)]
pub struct UrlList {
    urls: Vec<Url>,
}

impl UrlList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Is the list empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// All URLs in priority order (lowest value first).
    #[must_use]
    pub fn in_priority_order(&self) -> Vec<&Url> {
        let mut refs: Vec<&Url> = self.urls.iter().collect();
        refs.sort_by_key(|u| (u.priority, u.internal_id));
        refs
    }

    /// Adds a parsed specification; ids stay stable across the list's
    /// lifetime.
    pub fn add_spec(&mut self, spec: &str) -> Result<u32> {
        let id = self.urls.iter().map(|u| u.internal_id + 1).max().unwrap_or(0);
        let url = Url::parse(spec, id)?;
        self.urls.push(url);
        Ok(id)
    }

    /// Looks an URL up by internal id.
    #[must_use]
    pub fn by_id(&self, id: u32) -> Option<&Url> {
        self.urls.iter().find(|u| u.internal_id == id)
    }

    /// Mutable lookup by internal id.
    pub fn by_id_mut(&mut self, id: u32) -> Option<&mut Url> {
        self.urls.iter_mut().find(|u| u.internal_id == id)
    }

    /// Loads `Urls` + `revs` for the working copy. A missing `Urls` file
    /// yields an empty list (first-time use).
    pub fn load(waa: &Waa) -> Result<Self> {
        let bytes = match waa.read(waa.wc_path(), ext::URLS) {
            Ok(b) => b,
            Err(e) if e.is_not_found() => return Ok(Self::new()),
            Err(e) => return Err(e),
        };
        let mut list = Self::new();
        for record in records(&bytes) {
            let record = record?;
            let mut fields = record.splitn(5, ' ');
            let internal_id: u32 = parse_field(fields.next(), record)?;
            let priority: u32 = parse_field(fields.next(), record)?;
            let target = fields
                .next()
                .ok_or_else(|| damaged_url_list(record))?;
            let name = fields.next().ok_or_else(|| damaged_url_list(record))?;
            let url = fields.next().ok_or_else(|| damaged_url_list(record))?;
            list.urls.push(Url {
                url: url.to_owned(),
                name: (name != "-").then(|| name.to_owned()),
                priority,
                target_rev: if target == "-" {
                    None
                } else {
                    Some(parse_field(Some(target), record)?)
                },
                current_rev: 0,
                internal_id,
            });
        }

        match waa.read(waa.wc_path(), ext::REVS) {
            Ok(bytes) => {
                let mut revs: FxHashMap<u32, RevNum> = FxHashMap::default();
                for record in records(&bytes) {
                    let record = record?;
                    let (id, rev) = record
                        .split_once(' ')
                        .ok_or_else(|| damaged_url_list(record))?;
                    revs.insert(
                        parse_field(Some(id), record)?,
                        parse_field(Some(rev), record)?,
                    );
                }
                for url in &mut list.urls {
                    if let Some(rev) = revs.get(&url.internal_id) {
                        url.current_rev = *rev;
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        Ok(list)
    }

    /// Writes the `Urls` configuration file.
    pub fn save(&self, waa: &Waa) -> Result<()> {
        let mut writer = waa.start_write(waa.wc_path(), ext::URLS)?;
        for url in &self.urls {
            write!(
                writer,
                "{} {} {} {} {}\0\n",
                url.internal_id,
                url.priority,
                url.target_rev
                    .map_or_else(|| "-".to_owned(), |r| r.to_string()),
                url.name.as_deref().unwrap_or("-"),
                url.url
            )
            .context("writing URL record")?;
        }
        writer.commit()
    }

    /// Writes the volatile `revs` map.
    pub fn save_revs(&self, waa: &Waa) -> Result<()> {
        let mut writer = waa.start_write(waa.wc_path(), ext::REVS)?;
        for url in &self.urls {
            write!(writer, "{} {}\0\n", url.internal_id, url.current_rev)
                .context("writing revision record")?;
        }
        writer.commit()
    }
}

fn damaged_url_list(record: &str) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("malformed URL record \"{record}\""),
    )
}

fn parse_field<T: std::str::FromStr>(value: Option<&str>, record: &str) -> Result<T> {
    value
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| damaged_url_list(record))
}

/// Iterates `\0\n`-terminated records.
fn records(bytes: &[u8]) -> impl Iterator<Item = Result<&str>> {
    bytes
        .split_inclusive(|&b| b == b'\n')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let chunk = chunk
                .strip_suffix(b"\0\n")
                .ok_or_else(|| Error::new(ErrorKind::Io, "unterminated record"))?;
            std::str::from_utf8(chunk)
                .map_err(|_| Error::new(ErrorKind::Io, "record is not text"))
        })
}
