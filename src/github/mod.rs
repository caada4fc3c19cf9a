//! GitHub REST proxy layer.
//!
//! | Module     | Responsibility                                                |
//! |------------|---------------------------------------------------------------|
//! | `client`   | `GitHubApi` trait and its `reqwest` implementation            |
//! | `models`   | Wire types: repos, branches, contents, commits, pull requests |
//! | `oauth`    | Authorize URL, token response handling, token format check    |
//! | `fallback` | Retry ref-scoped calls on the default branch                  |

pub mod client;
#[cfg(test)]
pub mod fake;
pub mod fallback;
pub mod models;
pub mod oauth;

pub use client::{GitHubApi, RestClient};
pub use fallback::{Fallback, execute_with_branch_fallback};
pub use models::*;
