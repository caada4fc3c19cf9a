//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `config` | `Config`         |
//! | `check`  | `Check`          |

pub mod check;
pub mod config;
pub mod serve;

pub use check::cmd_check;
pub use config::cmd_config;
pub use serve::cmd_serve;
