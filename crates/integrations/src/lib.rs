//! Consumers of profile snapshots.
//!
//! Each adapter takes a plain map of variables and turns it into something
//! another tool understands: an ssh/scp invocation, docker flags, a curl
//! command with provider auth, or a subprocess environment. Adapters never
//! read profile files themselves; callers pass in the data.

pub mod curl;
pub mod detect;
pub mod docker;
pub mod exec;
pub mod ssh;

pub use curl::CurlEnv;
pub use detect::{DetectedKey, detect_by_prefix, looks_like_api_key, provider_category};
pub use docker::DockerEnv;
pub use ssh::SshEnv;
