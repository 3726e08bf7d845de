use crate::ComponentAction;
use crate::commands::install::print_step;
use crate::commands::{context, local_context, services};
use anyhow::{Context, Result};
use panelo_config::Config;
use panelo_provision::components::component;
use panelo_provision::{ComponentId, Driver};

pub async fn run(config: Config, id: &str, action: ComponentAction) -> Result<()> {
    let id: ComponentId = id.parse()?;
    let ctx = match action {
        ComponentAction::Install => context(config, None, None).await?,
        _ => local_context(config).await?,
    };
    let target = component(id);

    match action {
        ComponentAction::Install => {
            let report = Driver::new(&ctx)
                .on_step(print_step)
                .install_component(id)
                .await?;
            report
                .into_result()
                .with_context(|| format!("Failed to install {}", id))?;
        }
        ComponentAction::Start => {
            target.start(&ctx).await?;
            println!("✓ Started {}", id);
        }
        ComponentAction::Stop => {
            target.stop(&ctx).await?;
            println!("✓ Stopped {}", id);
        }
        ComponentAction::Restart => {
            target.stop(&ctx).await?;
            target.start(&ctx).await?;
            println!("✓ Restarted {}", id);
        }
        ComponentAction::Status => {
            let status = target.status(&ctx).await?;
            println!("{}", services::render(&[(id, status)]));
        }
    }
    Ok(())
}
