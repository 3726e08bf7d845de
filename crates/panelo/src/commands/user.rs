use crate::UserCommands;
use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::{Config, parser};
use panelo_provision::credentials::{PASSWORD_LENGTH, generate_password, hash_password};
use panelo_provision::deploy::sanitize_user;
use panelo_provision::{Deployer, ProvisionContext};
use panelo_state::{Role, User, UserStatus};

pub fn render(users: &[User], apps_per_user: impl Fn(&User) -> usize) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["USER", "EMAIL", "ROLE", "STATUS", "APPS", "CREATED"]);
    for user in users {
        let role = match user.role {
            Role::Admin => "admin",
            Role::User => "user",
        };
        let status = match user.status {
            UserStatus::Active => Cell::new("active").fg(Color::Green),
            UserStatus::Inactive => Cell::new("inactive").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&user.name),
            Cell::new(&user.email),
            Cell::new(role),
            status,
            Cell::new(apps_per_user(user)),
            Cell::new(user.created_at.format("%Y-%m-%d")),
        ]);
    }
    table
}

fn add(ctx: &ProvisionContext, name: &str, email: &str, admin: bool) -> Result<()> {
    let name = sanitize_user(name)?;
    parser::validate_email(email)?;
    let password = generate_password(PASSWORD_LENGTH);
    let role = if admin { Role::Admin } else { Role::User };
    let user = User::new(name, email, role, hash_password(&password)?);

    let _lock = ctx.lock()?;
    let user = ctx.store().update(|state| state.add_user(user))?;
    println!("✓ Added {} <{}>", user.name, user.email);
    println!("  Password: {}", password);
    Ok(())
}

async fn remove(ctx: &ProvisionContext, name: &str) -> Result<()> {
    let state = ctx.store().load()?;
    let user = state
        .user(name)
        .ok_or_else(|| panelo_state::Error::UserNotFound(name.to_string()))?;
    let apps: Vec<String> = state
        .applications
        .iter()
        .filter(|app| app.owner == user.id)
        .map(|app| app.name.clone())
        .collect();

    let deployer = Deployer::new(ctx);
    for app in &apps {
        deployer
            .remove(app, name)
            .await
            .with_context(|| format!("Failed to remove application {} of {}", app, name))?;
        println!("✓ Removed application {}", app);
    }

    let _lock = ctx.lock()?;
    let removed = ctx.store().update(|state| state.remove_user(name))?;
    println!(
        "✓ Removed {} ({} applications, {} domains)",
        removed.user.name,
        apps.len() + removed.applications.len(),
        removed.domains.len()
    );
    Ok(())
}

pub async fn run(config: Config, command: UserCommands) -> Result<()> {
    let ctx = local_context(config).await?;

    match command {
        UserCommands::Add { name, email, admin } => add(&ctx, &name, &email, admin)?,
        UserCommands::List => {
            let state = ctx.store().load()?;
            let count = |user: &User| {
                state
                    .applications
                    .iter()
                    .filter(|app| app.owner == user.id)
                    .count()
            };
            println!("{}", render(&state.users, count));
        }
        UserCommands::Deactivate { name } => {
            let _lock = ctx.lock()?;
            ctx.store().update(|state| state.deactivate_user(&name))?;
            println!("✓ Deactivated {}", name);
        }
        UserCommands::Remove { name } => remove(&ctx, &name).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_table() {
        let mut alice = User::new("alice", "alice@example.com", Role::User, "!");
        alice.status = UserStatus::Inactive;
        let admin = User::new("admin", "admin@panelo.com", Role::Admin, "!");
        let rendered = render(&[admin, alice], |user| if user.name == "alice" { 2 } else { 0 })
            .to_string();
        assert!(rendered.contains("alice@example.com"));
        assert!(rendered.contains("inactive"));
        assert!(rendered.contains("admin"));
    }
}
