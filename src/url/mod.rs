//! URL handling: normalization to the deduplication identity, origin/domain
//! extraction, and host pattern matching for the policy gate's allow/deny
//! lists.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, extract_origin};
pub use matcher::{any_matches, compile_patterns, matches_wildcard, HostPattern};
pub use normalize::{normalize_url, normalize_url_with_policy, DEFAULT_BLOCK_LIST};
