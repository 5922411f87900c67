//! crates/engine/src/commit.rs
//!
//! The commit driver: send every selected, changed entry to the
//! repository, regenerate block-hash sidecars from the cleartext on the
//! way, and resolve the in-flight revision sentinel when the transaction
//! lands.

use crate::Engine;
use crate::pipe::filter_bytes;
use base::error::ResultExt;
use base::status::{ChangeFlag, EntryFlags, StatusBits};
use base::{Error, Result, RevNum, SET_REVNUM};
use checksums::{Manber, md5_to_hex, sidecar};
use metadata::{FileKind, StatInfo, special};
use repos::props::{FilePropertyStore, PropertyStore};
use repos::propname;
use repos::session::{PropList, Session};
use tracing::debug;
use tree::{EntryId, EntryStore};
use waa::ext;

/// Builds the meta-data property list for an entry.
fn meta_props(st: &StatInfo) -> PropList {
    vec![
        (
            propname::TEXT_TIME.to_owned(),
            format!("{}.{}", st.mtime_sec, st.mtime_nsec),
        ),
        (propname::OWNER.to_owned(), st.uid.to_string()),
        (propname::GROUP.to_owned(), st.gid.to_string()),
        (
            propname::UNIX_MODE.to_owned(),
            format!("0{:o}", st.perm_bits()),
        ),
    ]
}

impl Engine<'_> {
    /// Commits everything the walk flagged as changed through the URL
    /// with internal id `url_id`; entries without a URL association yet
    /// become that URL's. Returns the new revision, or `None` when there
    /// was nothing to commit.
    pub fn commit_tree(
        &self,
        store: &mut EntryStore,
        session: &mut dyn Session,
        message: &str,
        url_id: u32,
    ) -> Result<Option<RevNum>> {
        session.begin_commit(message)?;

        let outcome = (|| -> Result<usize> {
            let mut sent = 0usize;
            for id in store.ids().collect::<Vec<_>>() {
                sent += usize::from(self.commit_entry(store, id, session, url_id)?);
            }
            Ok(sent)
        })();

        match outcome {
            Ok(0) => {
                session.abort_commit();
                debug!("nothing to commit");
                Ok(None)
            }
            Ok(count) => {
                let rev = session.finish_commit()?;
                debug!(rev, count, "commit finished");
                for id in store.ids().collect::<Vec<_>>() {
                    let entry = store.get_mut(id);
                    if entry.repos_rev == SET_REVNUM {
                        entry.repos_rev = rev;
                    }
                }
                Ok(Some(rev))
            }
            Err(e) => {
                session.abort_commit();
                Err(e)
            }
        }
    }

    /// Sends one entry if its state asks for it. Returns whether
    /// something was staged.
    fn commit_entry(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        session: &mut dyn Session,
        url_id: u32,
    ) -> Result<bool> {
        let entry = store.get(id);
        if entry.to_be_ignored || !entry.do_this_entry {
            return Ok(false);
        }
        let rel = store.rel_str(id);
        if rel.is_empty() {
            return Ok(false);
        }

        if entry.flags.contains(EntryFlags::UNVERSION) {
            session.delete_entry(&rel)?;
            let entry = store.get_mut(id);
            entry.to_be_ignored = true;
            entry.flags -= EntryFlags::UNVERSION;
            return Ok(true);
        }

        let status = entry.entry_status;
        let flags = entry.flags;
        if !status.intersects(StatusBits::CHANGE_MASK | StatusBits::LIKELY)
            && !flags.intersects(EntryFlags::ADD | EntryFlags::PUSH_PROPS)
        {
            return Ok(false);
        }

        if (status & StatusBits::REPLACED) == StatusBits::REMOVED {
            session.delete_entry(&rel)?;
            store.get_mut(id).to_be_ignored = true;
            return Ok(true);
        }

        // Settle a deferred content check before deciding what to send.
        let abs = self.waa.wc_path().join(&rel);
        if status.contains(StatusBits::LIKELY) {
            walk::resolve_likely(store, id, self.waa, &abs)?;
        }
        let status = store.get(id).entry_status;
        if !status.intersects(StatusBits::CHANGE_MASK)
            && !flags.intersects(EntryFlags::ADD | EntryFlags::PUSH_PROPS)
        {
            return Ok(false);
        }

        if status.is_replaced() {
            session.delete_entry(&rel)?;
        }

        let local = store
            .get(id)
            .local_meta
            .ok_or_else(|| Error::internal(format!("committing \"{rel}\" without local state")))?;

        // A replacement may have changed the entry's role; the payload
        // follows the type that exists now.
        if local.is_dir() != store.get(id).is_dir() {
            store.get_mut(id).payload = tree::Payload::for_kind(local.kind());
        }

        let mut props = meta_props(&local);

        // User-defined properties ride along; values carrying the
        // removal sentinel are withheld and dropped once the commit is
        // through.
        let mut prop_store = Box::new(FilePropertyStore::open(self.waa, &abs)?);
        let mut doomed = Vec::new();
        for (key, value) in prop_store.entries() {
            if value == repos::props::REMOVAL_SENTINEL {
                doomed.push(key.to_owned());
                continue;
            }
            if let Ok(text) = std::str::from_utf8(value) {
                props.push((key.to_owned(), text.to_owned()));
            }
        }

        let send_content = status.intersects(
            StatusBits::NEW | StatusBits::CHANGED | StatusBits::REMOVED,
        ) || flags.contains(EntryFlags::ADD);

        match local.kind() {
            FileKind::Directory => {
                if status.intersects(StatusBits::NEW) || flags.contains(EntryFlags::ADD) {
                    session.make_dir(&rel, &props)?;
                } else {
                    session.change_props(&rel, &props)?;
                }
            }
            FileKind::File if send_content => {
                self.commit_file_content(store, id, &rel, &abs, &mut props, session)?;
            }
            FileKind::Symlink if send_content => {
                let target = special::read_link(&abs)?;
                props.push((propname::SPECIAL.to_owned(), "*".to_owned()));
                let content = format!("{}{target}", special::LINK_SPEC);
                session.put_file(&rel, &mut content.as_bytes(), &props)?;
                store.get_mut(id).file_mut().expect("symlink payload").md5 =
                    checksums::Md5::digest(target.as_bytes());
            }
            FileKind::BlockDev | FileKind::CharDev if send_content => {
                props.push((propname::SPECIAL.to_owned(), "*".to_owned()));
                let content = special::dev_to_string(&local);
                session.put_file(&rel, &mut content.as_bytes(), &props)?;
            }
            _ => {
                // Meta-data only.
                session.change_props(&rel, &props)?;
            }
        }

        if !doomed.is_empty() {
            for key in &doomed {
                prop_store.delete(key);
            }
            prop_store.close(true)?;
        }

        // Bookkeeping for the resolved revision and the next walk.
        let entry = store.get_mut(id);
        entry.meta = local;
        entry.old_rev = entry.repos_rev;
        entry.repos_rev = SET_REVNUM;
        if entry.url_id.is_none() {
            entry.url_id = Some(url_id);
        }
        entry.flags -= EntryFlags::CHECK | EntryFlags::PUSH_PROPS | EntryFlags::ADD
            | EntryFlags::IS_NEW;
        entry.entry_status = StatusBits::empty();
        if let Some(f) = entry.file_mut() {
            f.change_flag = ChangeFlag::Unknown;
        }
        Ok(true)
    }

    /// Streams a file's cleartext through the chunker (refreshing the
    /// sidecar), encodes it through the commit-pipe if one is configured,
    /// and stages the result.
    fn commit_file_content(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        rel: &str,
        abs: &std::path::Path,
        props: &mut PropList,
        session: &mut dyn Session,
    ) -> Result<()> {
        let data = std::fs::read(abs)
            .with_context(|| format!("reading \"{}\"", abs.display()))?;

        let mut lines = Vec::new();
        let mut manber = Manber::new();
        manber.update(&data, |block| sidecar::write_block(&mut lines, block))?;
        let (md5, len) = manber.finish();

        if len >= checksums::manber::MIN_SIDECAR_SIZE && !lines.is_empty() {
            let mut writer = self.waa.start_write(abs, ext::MD5S)?;
            std::io::Write::write_all(&mut writer, &lines)
                .context("writing the block-hash sidecar")?;
            writer.commit()?;
        } else {
            self.waa.delete(abs, ext::MD5S, true)?;
        }

        let encoder = props
            .iter()
            .find(|(k, _)| k == propname::COMMIT_PIPE)
            .map(|(_, v)| v.clone());
        let payload = match encoder {
            Some(command) => {
                props.push((propname::ORIGINAL_MD5.to_owned(), md5_to_hex(&md5)));
                let env = self.child_env(abs, None);
                filter_bytes(&command, &data, &env)?
            }
            None => data,
        };

        session.put_file(rel, &mut payload.as_slice(), props)?;

        let file = store.get_mut(id).file_mut().expect("file payload");
        file.md5 = md5;
        file.change_flag = ChangeFlag::NotChanged;
        Ok(())
    }
}
