//! # gitswitch - Git Identity Manager
//!
//! Ranks configured Git identities for a repository from its remote URL and
//! working-tree path, learns new patterns from the accounts you pick, and
//! guards commits against the wrong email.
//!
//! The ranking engine in [`suggest`] and [`learn`] is pure: it takes the
//! identities, recent history and a clock through [`suggest::EngineOptions`]
//! and never touches disk. Persistence lives in [`config`] and [`history`].

pub mod account;
pub mod cli;
pub mod config;
pub mod git;
pub mod history;
pub mod hook;
pub mod identity;
pub mod learn;
pub mod pattern;
pub mod project;
pub mod reason;
pub mod remote;
pub mod suggest;
pub mod version;
