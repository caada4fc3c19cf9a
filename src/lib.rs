//! Staticms: edit Markdown and YAML content stored in GitHub repositories
//! through a web form and submit the edits as pull requests.
//!
//! | Module       | Responsibility                                            |
//! |--------------|-----------------------------------------------------------|
//! | `config`     | `staticms.toml`, environment and CLI layering             |
//! | `content`    | Content config, field validation, front matter documents  |
//! | `github`     | REST client, OAuth helpers, branch-fallback retry         |
//! | `session`    | In-memory sessions and cookie helpers                     |
//! | `submission` | Edited files to branch, commits and pull request          |
//! | `events`     | Event bus for SSE plus webhook parsing and verification   |
//! | `server`     | axum router, handlers and the embedded UI                 |
//! | `logging`    | `tracing` subscriber setup                                |
//! | `errors`     | Typed library errors                                      |

pub mod config;
pub mod content;
pub mod errors;
pub mod events;
pub mod github;
pub mod logging;
pub mod server;
pub mod session;
pub mod submission;
