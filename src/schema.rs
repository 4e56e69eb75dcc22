use schemars::schema_for;

use crate::model::plan::PlatformConfig;

/// Generate and print the JSON Schema for `PlatformConfig`.
pub fn run() -> anyhow::Result<()> {
    let schema = schema_for!(PlatformConfig);
    let json = serde_json::to_string_pretty(&schema)?;
    println!("{json}");
    Ok(())
}
