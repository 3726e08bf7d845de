use crate::AppCommands;
use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::Config;
use panelo_provision::{AppSummary, DeployRequest, Deployer, Outcome};
use panelo_state::AppStatus;

fn status_cell(status: AppStatus) -> Cell {
    let color = match status {
        AppStatus::Running => Color::Green,
        AppStatus::Creating => Color::Yellow,
        AppStatus::Stopped => Color::DarkGrey,
        AppStatus::Error => Color::Red,
    };
    Cell::new(status).fg(color)
}

pub fn render(apps: &[AppSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["APP", "USER", "KIND", "DOMAIN", "PORT", "STATUS", "UPDATED"]);
    for app in apps {
        table.add_row(vec![
            Cell::new(&app.name),
            Cell::new(&app.user),
            Cell::new(app.kind),
            Cell::new(&app.domain),
            Cell::new(app.port),
            status_cell(app.status),
            Cell::new(app.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table
}

pub async fn deploy(config: Config, request: DeployRequest) -> Result<()> {
    let ctx = local_context(config).await?;
    let label = format!("{} ({}) for {}", request.name, request.kind, request.user);
    let deployment = Deployer::new(&ctx)
        .deploy(request)
        .await
        .with_context(|| format!("Failed to deploy {}", label))?;

    match &deployment.outcome {
        Outcome::Unchanged => println!("= {} already deployed", deployment.container),
        Outcome::Changed(summary) => println!("✓ {}: {}", deployment.container, summary),
    }
    println!("  Port: 127.0.0.1:{}", deployment.port);
    println!("  Virtual host: {}", deployment.vhost_path.display());
    if let Some(cert) = &deployment.certificate {
        println!("  Certificate: {}", cert.cert.display());
    }
    Ok(())
}

pub async fn run(config: Config, command: AppCommands) -> Result<()> {
    let ctx = local_context(config).await?;
    let deployer = Deployer::new(&ctx);

    match command {
        AppCommands::List => {
            let apps = deployer.list()?;
            if apps.is_empty() {
                println!("No applications deployed");
            } else {
                println!("{}", render(&apps));
            }
        }
        AppCommands::Status { name, user } => {
            let status = deployer.status(&name, &user).await?;
            println!("{}-{}: {}", name, user, status);
        }
        AppCommands::Start { name, user } => {
            deployer.start(&name, &user).await?;
            println!("✓ Started {}-{}", name, user);
        }
        AppCommands::Stop { name, user } => {
            deployer.stop(&name, &user).await?;
            println!("✓ Stopped {}-{}", name, user);
        }
        AppCommands::Restart { name, user } => {
            deployer.restart(&name, &user).await?;
            println!("✓ Restarted {}-{}", name, user);
        }
        AppCommands::Remove { name, user } => {
            let app = deployer.remove(&name, &user).await?;
            println!("✓ Removed {} (files kept)", app.container);
        }
    }
    Ok(())
}
