//! External collaborators the core calls but does not implement: HTTP
//! transport, cookie jar, filesystem, and HTML normaliser (spec §6).
//! Their contracts are spec-fixed; only the core's use of them is ours.

pub mod cookie_jar;
pub mod filesystem;
pub mod html_normalizer;
pub mod http_transport;
