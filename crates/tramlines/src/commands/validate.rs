use crate::commands::policy_paths;
use crate::config::Config;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;
use tramlines_guardrail::{load_policy, ClassifierRegistry};

/// Human-readable summary of one compiled policy file
fn describe(path: &Path, registry: &ClassifierRegistry) -> tramlines_guardrail::Result<String> {
    let policy = load_policy(path, registry)?;
    let mut out = format!(
        "ok    {} ({}, {} rules)",
        path.display(),
        policy.name,
        policy.len()
    );
    for rule in &policy.rules {
        out.push_str(&format!(
            "\n      - {} [{:?}] when {}",
            rule.name(),
            rule.action(),
            rule.condition().label()
        ));
    }
    Ok(out)
}

pub fn execute(cli_paths: &[PathBuf], config: &Config) -> Result<()> {
    let registry = config.registry()?;
    let paths = policy_paths(cli_paths, config);
    if paths.is_empty() {
        anyhow::bail!("No policy files given and none listed in the config");
    }

    let mut failures = 0;
    for path in &paths {
        match describe(path, &registry) {
            Ok(summary) => println!("{}", summary),
            Err(e) => {
                failures += 1;
                println!("error {}: {}", path.display(), e);
            }
        }
    }
    info!(files = paths.len(), failures, "Validated policy files");

    if failures > 0 {
        anyhow::bail!("{} of {} policy files failed validation", failures, paths.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.toml");
        std::fs::write(
            &path,
            r#"
name = "Names"
[[rules]]
name = "no-deletes"
action = "block"
message = "no"
when = { test = { value = "call_name", op = "equals", operand = "delete_file" } }
"#,
        )
        .unwrap();

        let summary = describe(&path, &ClassifierRegistry::new()).unwrap();
        assert!(summary.contains("(Names, 1 rules)"));
        assert!(summary.contains("no-deletes [Block] when call.name == \"delete_file\""));
    }

    #[test]
    fn test_execute_fails_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = \"x\"\n[[rules]]\nname = \"r\"\naction = \"block\"\n").unwrap();
        assert!(execute(&[path], &Config::default()).is_err());
    }

    #[test]
    fn test_execute_without_policies() {
        assert!(execute(&[], &Config::default()).is_err());
    }
}
