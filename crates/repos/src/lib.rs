#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The engine's view of everything repository-shaped: the [`Session`]
//! trait a transport must implement (fetch file text, list directories,
//! report remote changes, accept commits), the [`props::PropertyStore`]
//! interface with its flat-file standard implementation, the URL list
//! with its priority overlay, and the copy-relation store.
//!
//! [`mem::MemSession`] is a complete in-process repository behind the
//! same trait; the test suites and local scenarios run against it.

pub mod copy;
pub mod fs;
pub mod mem;
pub mod props;
pub mod session;
pub mod url;

pub use props::{PropertyStore, propname};
pub use session::{DeltaAction, RemoteDelta, Session};
pub use url::{Url, UrlList};
