//! Web server command: `staticms serve`.

use std::path::PathBuf;

use anyhow::Result;

use staticms::config::StaticmsConfig;
use staticms::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    project_dir: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    dev: bool,
    open: bool,
) -> Result<()> {
    let settings = StaticmsConfig::new(project_dir)?.with_overrides(host, port, dev);

    start_server(ServerConfig {
        settings,
        // No browser inside dev containers
        open_browser: open && !dev,
    })
    .await
}
