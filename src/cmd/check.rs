//! Local content config validation: `staticms check`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use staticms::content::{ContentConfig, Document, validate_values};

pub fn cmd_check(config_path: &Path, files: &[String], root: Option<&Path>) -> Result<()> {
    let yaml = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config = ContentConfig::parse(&yaml)
        .with_context(|| format!("{} is not a valid content config", config_path.display()))?;

    println!("{} is valid.", config_path.display());
    if let Some(branch) = &config.branch {
        println!("Preferred branch: {}", branch);
    }
    println!();

    println!("Collections ({}):", config.collections.len());
    for c in &config.collections {
        println!(
            "  - {} -> {}/*.{} ({} fields)",
            c.name,
            c.path,
            c.extension(),
            c.fields.len()
        );
    }
    println!("Singletons ({}):", config.singletons.len());
    for s in &config.singletons {
        println!("  - {} -> {} ({} fields)", s.name, s.path, s.fields.len());
    }

    if files.is_empty() {
        return Ok(());
    }

    let root = match root {
        Some(r) => r.to_path_buf(),
        None => config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    println!();
    let mut failures = 0;
    for file in files {
        let repo_path = file.trim_start_matches('/');
        let Some(target) = config.resolve(repo_path) else {
            println!("  ✗ {}: not part of any collection or singleton", repo_path);
            failures += 1;
            continue;
        };
        let disk_path = root.join(repo_path);
        let raw = std::fs::read_to_string(&disk_path)
            .with_context(|| format!("Failed to read {}", disk_path.display()))?;

        let format = target.format();
        let values = match Document::parse(&raw, format, repo_path) {
            Ok(doc) => doc.values(format),
            Err(e) => {
                println!("  ✗ {}: {}", repo_path, e);
                failures += 1;
                continue;
            }
        };
        let errors = validate_values(target.fields(), &values);
        if errors.is_empty() {
            println!("  ✓ {} ({})", repo_path, target.name());
        } else {
            failures += 1;
            println!("  ✗ {} ({})", repo_path, target.name());
            for e in errors {
                println!("      {}: {}", e.field, e.message);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} file(s) failed validation", failures, files.len());
    }
    Ok(())
}
