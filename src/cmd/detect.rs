//! Board detection command (`sketchforge detect`).

use anyhow::Result;

use sketchforge::config::ServiceConfig;
use sketchforge::sketch::SketchBuilder;

pub async fn cmd_detect(config: &ServiceConfig) -> Result<()> {
    let builder = SketchBuilder::from_config(config)?;

    match builder.detect_port().await {
        Ok(selection) => {
            println!("Port: {}", selection.port);
            println!("Matched rule: {}", selection.rule);
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", e.user_message()),
    }
}
