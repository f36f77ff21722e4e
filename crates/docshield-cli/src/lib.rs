//! Docshield command-line support: process setup and operator commands.

pub mod commands;
pub mod setup;

use serde::Serialize;

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{}", out);
    Ok(())
}
