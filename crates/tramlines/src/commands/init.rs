use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Tramlines Configuration

[sessions]
# Calls kept per session; older calls fall out of history
max_calls_per_session = 30
# Sessions idle this long are dropped
cleanup_hours = 24

[guardrail]
# Policy files (TOML or JSON), combined in order. Relative to this file.
policies = []
# Tools hidden from tool listings
disabled_tools = []

# Extra regex classifiers usable from policy files via `classify`.
# The built-in `pii` and `secrets` classifiers are always available.
# [[classifiers]]
# name = "internal_hosts"
# patterns = ['corp\.internal']
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}
