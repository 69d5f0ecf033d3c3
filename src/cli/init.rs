//! CLI `init` command: create the workspace and its bootstrap files.

use anyhow::Result;

use crate::config::CairnConfig;
use crate::workspace::Workspace;

pub fn init(config: &CairnConfig) -> Result<()> {
    let root = config.resolved_workspace_dir();
    let workspace = Workspace::new(&root);
    let created = workspace.initialize()?;

    println!("Workspace: {}", root.display());
    if created.is_empty() {
        println!("Already initialized, nothing to do.");
    } else {
        for name in &created {
            println!("  created {name}");
        }
    }
    println!();
    println!("Run `cairn reindex` to build the index, or `cairn serve` to start the MCP server.");
    Ok(())
}
