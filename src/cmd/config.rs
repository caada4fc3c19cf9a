//! Configuration view and validation commands: `staticms config`.

use anyhow::Result;

use staticms::config::{CONFIG_FILE, StaticmsConfig, StaticmsToml};

use super::super::ConfigCommands;

fn mask(secret: &Option<String>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "<set>",
        _ => "<unset>",
    }
}

fn print_sections(toml: &StaticmsToml) {
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    if let Some(url) = &toml.server.public_url {
        println!("  public_url = \"{}\"", url);
    }
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();

    println!("[github]");
    println!("  api_url = \"{}\"", toml.github.api_url);
    println!("  oauth_url = \"{}\"", toml.github.oauth_url);
    match &toml.github.client_id {
        Some(id) => println!("  client_id = \"{}\"", id),
        None => println!("  client_id = <unset>"),
    }
    println!("  client_secret = {}", mask(&toml.github.client_secret));
    println!("  webhook_secret = {}", mask(&toml.github.webhook_secret));
    println!("  user_agent = \"{}\"", toml.github.user_agent);
    println!();

    println!("[session]");
    println!("  cookie_name = \"{}\"", toml.session.cookie_name);
    println!("  ttl_hours = {}", toml.session.ttl_hours);
    println!("  secure_cookie = {}", toml.session.secure_cookie);
    println!();

    println!("[content]");
    println!("  config_path = \"{}\"", toml.content.config_path);
    println!("  branch_prefix = \"{}\"", toml.content.branch_prefix);
    println!();
}

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config = StaticmsConfig::new(project_dir.to_path_buf())?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Staticms Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using defaults. Run 'staticms config init' to create one.");
            }
            println!();

            // Effective values include environment overrides
            print_sections(&config.toml);
            println!("Effective values:");
            println!("  listen = {}", config.bind_addr());
            println!("  public_url = {}", config.public_url());
            println!("  oauth_redirect_uri = {}", config.redirect_uri());
            println!(
                "  oauth = {}",
                if config.oauth_configured() {
                    "configured"
                } else {
                    "not configured (token sign-in only)"
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults.", CONFIG_FILE);
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config.staticms_dir.exists() {
                std::fs::create_dir_all(&config.staticms_dir)?;
            }

            StaticmsToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, public_url");
            println!("  - [github] client_id (secrets via GITHUB_CLIENT_SECRET / GITHUB_WEBHOOK_SECRET)");
            println!("  - [session] ttl_hours, secure_cookie");
            println!("  - [content] config_path, branch_prefix");
            println!();
        }
    }

    Ok(())
}
