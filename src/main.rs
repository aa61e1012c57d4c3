use anyhow::Result;

use xray_lime::ExplainContext;

/// Test-set example explained when run directly.
const EXAMPLE_INDEX: usize = 0;

fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::current_dir()?.join("config.yml");
    let context = ExplainContext::setup(&config_path)?;
    context.explain_example(EXAMPLE_INDEX)?;
    Ok(())
}
