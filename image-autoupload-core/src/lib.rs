#![doc = "image-autoupload-core: core logic library for image-autoupload."]

//! Finds image references in a markdown note, resolves them against the
//! repository the note lives in, uploads them one at a time through an
//! [`contract::Uploader`], and rewrites the note to point at the hosted URLs.
//! A regex rule engine for bulk link rewriting lives next to it.
//!
//! The host editor is never touched directly: every interaction goes through
//! the traits in [`contract`], so the whole pipeline runs against mocks in tests
//! and against the filesystem in the CLI crate.
//!
//! # Usage
//! Build a [`contract::Host`] from your collaborators, load [`settings::Settings`],
//! then call [`orchestrate::upload_all_images`].

pub mod cache;
pub mod contract;
pub mod download;
pub mod error;
pub mod link_replacement;
pub mod orchestrate;
pub mod paste;
pub mod remove;
pub mod resolver;
pub mod rewrite;
pub mod scanner;
pub mod settings;
