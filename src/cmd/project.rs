//! Project setup: `jobtrack init`.

use anyhow::{Context, Result};
use std::path::Path;

use jobtrack::config::{TrackerToml, starter_config};
use jobtrack::tracker::server::open_store;

pub fn cmd_init(config_path: &Path, settings: &TrackerToml, force: bool) -> Result<()> {
    let settings = if config_path.exists() && !force {
        println!(
            "{} {}",
            console::style("Keeping existing config").dim(),
            config_path.display()
        );
        settings.clone()
    } else {
        if let Some(parent) = config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let mut starter = starter_config();
        starter.database = settings.database.clone();
        starter.save(config_path)?;
        println!(
            "{} {}",
            console::style("Wrote").green().bold(),
            config_path.display()
        );
        starter
    };

    for warning in settings.validate() {
        println!("  {} {}", console::style("⚠").yellow(), warning);
    }

    let mut server = settings.server_config();
    server.in_memory = false;
    let store = open_store(&server)?;
    let processes = store
        .lock_sync()?
        .processes()
        .context("Failed to read process catalog")?;

    println!(
        "{} {} ({} processes, {} users)",
        console::style("Database ready at").green().bold(),
        server.db_path.display(),
        processes.len(),
        settings.users.len()
    );
    Ok(())
}
