//! crates/cli/src/actions.rs
//!
//! The action bodies: thin glue between the walker, the engine and the
//! administrative area.

use crate::args::{Action, Parsed};
use crate::output;
use base::error::ResultExt;
use base::options::Context;
use base::status::{EntryFlags, StatusBits};
use base::{Error, ErrorKind, Result};
use engine::Engine;
use filters::{PatternList, Position};
use repos::UrlList;
use repos::fs::FsRepository;
use std::io::Write;
use std::path::Path;
use tracing::debug;
use tree::{Entry, EntryId, EntryStore, dir_file};
use waa::{Waa, ext};
use walk::Walker;

/// Writes one line to stdout; a vanished reader turns into the silent
/// broken-pipe exit.
fn emit(line: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}").map_err(|e| Error::io(e, "writing to stdout"))
}

/// Runs the parsed action.
pub fn dispatch(parsed: Parsed) -> Result<()> {
    let mut app = App::open(parsed.ctx)?;
    match parsed.action {
        Action::Urls { specs } => app.urls(specs),
        Action::Ignore { patterns } => app.ignore(patterns),
        Action::Status { paths, check } => app.status(&paths, check),
        Action::Commit { message, paths } => app.commit(&message, &paths),
        Action::Update { revision } => app.update(revision),
        Action::Revert { paths } => app.revert(&paths),
        Action::Resolved { paths } => app.resolved(&paths),
    }
}

struct App {
    ctx: Context,
    waa: Waa,
    patterns: PatternList,
    urls: UrlList,
}

impl App {
    fn open(ctx: Context) -> Result<Self> {
        let cwd = std::env::current_dir().context("getting the working directory")?;
        let waa = Waa::open(
            ctx.waa_root.get(),
            ctx.conf_root.get(),
            ctx.softroot_path(),
            &cwd,
        )?;

        let patterns = match waa.read(waa.wc_path(), ext::IGN) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| Error::new(ErrorKind::Io, "the pattern list is not text"))?;
                PatternList::parse(&text)?
            }
            Err(e) if e.is_not_found() => PatternList::new(),
            Err(e) => return Err(e),
        };
        let urls = UrlList::load(&waa)?;
        debug!(wc = %waa.wc_path().display(), urls = urls.len(), "working copy opened");

        Ok(Self {
            ctx,
            waa,
            patterns,
            urls,
        })
    }

    fn walker(&self) -> Walker<'_> {
        Walker::new(&self.ctx, &self.waa, &self.patterns)
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(&self.ctx, &self.waa)
    }

    fn load_store(&self) -> Result<Option<EntryStore>> {
        match self.waa.open_read(self.waa.wc_path(), ext::DIR) {
            Ok(file) => Ok(Some(dir_file::read_file(&file)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fresh_store(&self) -> Result<EntryStore> {
        let meta = metadata::lstat(self.waa.wc_path())?;
        Ok(EntryStore::new(Entry::new(".", meta)))
    }

    fn save_store(&self, store: &mut EntryStore) -> Result<()> {
        let mut writer = self.waa.start_write(self.waa.wc_path(), ext::DIR)?;
        dir_file::write(store, &mut writer)?;
        writer.commit()
    }

    /// The session for this WC's highest-priority URL.
    fn session(&self) -> Result<(u32, FsRepository)> {
        let url = self
            .urls
            .in_priority_order()
            .first()
            .copied()
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    "no repository URL configured; run \"trackfs urls <URL>\" first",
                )
            })?;
        let path = url.url.strip_prefix("file://").ok_or_else(|| {
            Error::new(
                ErrorKind::Protocol,
                format!(
                    "\"{}\": only file:// repositories are available in this build",
                    url.url
                ),
            )
        })?;
        Ok((url.internal_id, FsRepository::open_or_create(Path::new(path))?))
    }

    fn urls(&mut self, specs: Vec<String>) -> Result<()> {
        if specs.is_empty() {
            for url in self.urls.in_priority_order() {
                emit(&format!(
                    "{} (prio {}, at revision {})",
                    url.url, url.priority, url.current_rev
                ))?;
            }
            return Ok(());
        }
        for spec in &specs {
            self.urls.add_spec(spec)?;
        }
        self.urls.save(&self.waa)?;
        self.urls.save_revs(&self.waa)?;
        self.waa.write_readme()?;
        Ok(())
    }

    fn ignore(&mut self, patterns: Vec<String>) -> Result<()> {
        if patterns.is_empty() {
            print!("{}", self.patterns.serialize());
            return Ok(());
        }
        self.patterns
            .add_specs(patterns.iter().map(String::as_str), Position::End)?;
        let mut writer = self.waa.start_write(self.waa.wc_path(), ext::IGN)?;
        writer
            .write_all(self.patterns.serialize().as_bytes())
            .context("writing the pattern list")?;
        writer.commit()
    }

    fn status(&self, paths: &[String], check: bool) -> Result<()> {
        let verbosity = self.ctx.verbosity.value();
        let waa = &self.waa;
        let wc = self.waa.wc_path().to_path_buf();

        let mut action = move |store: &mut EntryStore, id: EntryId| -> Result<()> {
            if check
                && store
                    .get(id)
                    .entry_status
                    .contains(StatusBits::LIKELY)
            {
                let abs = wc.join(store.rel_path(id));
                walk::resolve_likely(store, id, waa, &abs)?;
            }
            if let Some(line) = output::status_line(store, id, verbosity) {
                emit(&line)?;
            }
            Ok(())
        };

        match self.load_store()? {
            Some(mut store) => {
                if !paths.is_empty() {
                    self.walker().select_paths(&mut store, paths)?;
                }
                self.walker().update_tree(&mut store, &mut action)
            }
            None => {
                // Nothing recorded yet: the whole tree is new.
                let mut store = self.fresh_store()?;
                self.walker()
                    .build_tree(&mut store, EntryId::ROOT, &mut action)
            }
        }
    }

    fn commit(&mut self, message: &str, paths: &[String]) -> Result<()> {
        let (url_id, mut session) = self.session()?;

        let mut store;
        match self.load_store()? {
            Some(existing) => {
                store = existing;
                if !paths.is_empty() {
                    self.walker().select_paths(&mut store, paths)?;
                }
                self.walker()
                    .update_tree(&mut store, &mut |_, _| Ok(()))?;
            }
            None => {
                store = self.fresh_store()?;
                self.walker()
                    .build_tree(&mut store, EntryId::ROOT, &mut |_, _| Ok(()))?;
            }
        }

        let committed = self
            .engine()
            .commit_tree(&mut store, &mut session, message, url_id)?;
        match committed {
            Some(rev) => {
                if let Some(url) = self.urls.by_id_mut(url_id) {
                    url.current_rev = rev;
                }
                self.urls.save_revs(&self.waa)?;
                self.save_store(&mut store)?;
                if self.ctx.verbosity.value() > 0 {
                    emit(&format!("Committed revision {rev}."))?;
                }
            }
            None => {
                if self.ctx.verbosity.value() > 0 {
                    emit("Nothing to commit.")?;
                }
            }
        }
        Ok(())
    }

    fn update(&mut self, revision: Option<u64>) -> Result<()> {
        let (url_id, mut session) = self.session()?;
        let mut store = self.load_store()?.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                "this working copy has no entry list yet; commit or sync first",
            )
        })?;

        // Local state first: conflict mediation needs to know what
        // changed here.
        self.walker().update_tree(&mut store, &mut |_, _| Ok(()))?;

        let base = self
            .urls
            .by_id(url_id)
            .map_or(0, |u| u.current_rev);
        let target = self
            .engine()
            .apply_remote(&mut store, &mut session, base, revision)?;

        if let Some(url) = self.urls.by_id_mut(url_id) {
            url.current_rev = target;
        }
        self.urls.save_revs(&self.waa)?;
        self.save_store(&mut store)?;
        if self.ctx.verbosity.value() > 0 {
            emit(&format!("Updated to revision {target}."))?;
        }
        Ok(())
    }

    fn revert(&mut self, paths: &[String]) -> Result<()> {
        let (_url_id, mut session) = self.session()?;
        let mut store = self.load_store()?.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                "this working copy has no entry list yet; nothing to revert",
            )
        })?;

        if !paths.is_empty() {
            self.walker().select_paths(&mut store, paths)?;
        }
        self.walker().update_tree(&mut store, &mut |_, _| Ok(()))?;
        let copies = repos::copy::CopyRelations::load(&self.waa)?;
        self.engine().revert_tree(&mut store, &mut session, &copies)?;

        if self.ctx.verbosity.value() > 0 {
            for id in store.ids().collect::<Vec<_>>() {
                if store.get(id).flags.contains(EntryFlags::PRINT) {
                    let rel = store.rel_str(id);
                    emit(&format!("Reverted \"./{rel}\"."))?;
                    store.get_mut(id).flags -= EntryFlags::PRINT;
                }
            }
        }
        self.save_store(&mut store)
    }

    fn resolved(&mut self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Err(Error::new(
                ErrorKind::NotFound,
                "resolved needs at least one path",
            ));
        }
        let mut store = self.load_store()?.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                "this working copy has no entry list yet",
            )
        })?;
        self.walker().select_paths(&mut store, paths)?;

        for id in store.ids().collect::<Vec<_>>() {
            if !store.get(id).do_userselected {
                continue;
            }
            if store.get(id).flags.contains(EntryFlags::CONFLICT) {
                self.engine().resolve_conflict(&mut store, id)?;
            } else if self.ctx.verbosity.value() > 0 {
                emit(&format!(
                    "\"./{}\" is not in conflict.",
                    store.rel_str(id)
                ))?;
            }
        }
        self.save_store(&mut store)
    }
}
