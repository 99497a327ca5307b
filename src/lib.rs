//! Discourse thread migrator library.
//!
//! A sequential batch tool that mirrors wiki-hosted discussion threads into
//! a Discourse forum: one topic per thread (found or created by the page's
//! canonical URL), one post per comment with original timestamps and reply
//! structure, then watch subscriptions for participants and page followers.

pub mod config;
pub mod forum;
pub mod sync;
pub mod wiki;
