// repo-puller library: keeps a local working copy in step with one remote branch.

pub mod config;
pub mod git;
pub mod remote;
pub mod repo;
pub mod runtime;
pub mod sync;
