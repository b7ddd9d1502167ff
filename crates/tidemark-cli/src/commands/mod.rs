//! Subcommand implementations.

pub mod compression;
pub mod hypertable;
pub mod policy;

/// Print a JSON document to stdout.
pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
