// Git plumbing: command execution against the working copy.

pub mod worker;
