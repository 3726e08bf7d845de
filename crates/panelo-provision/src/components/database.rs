//! MySQL or PostgreSQL container holding the panel schema

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::credentials::{self, SeedAccounts};
use crate::host::docker::{self, ContainerSpec};
use crate::readiness::wait_for;
use crate::reconciler::{FileSet, StepRecorder};
use crate::Result;
use async_trait::async_trait;
use command_executor::Command;
use panelo_config::DatabaseKind;
use panelo_state::{SEED_ADMIN_EMAIL, SEED_USER_EMAIL};
use std::fs;
use tracing::info;

/// Schema (PostgreSQL) or database (MySQL) created for the panel
pub const SCHEMA_NAME: &str = "server_panel";

/// Container name of the database engine
pub fn container_name(kind: DatabaseKind) -> &'static str {
    match kind {
        DatabaseKind::Mysql => "panelo-mysql",
        DatabaseKind::Postgresql => "panelo-postgres",
    }
}

/// Port the engine listens on
pub fn port(kind: DatabaseKind) -> u16 {
    match kind {
        DatabaseKind::Mysql => 3306,
        DatabaseKind::Postgresql => 5432,
    }
}

fn image(kind: DatabaseKind) -> &'static str {
    match kind {
        DatabaseKind::Mysql => "mysql:8.0",
        DatabaseKind::Postgresql => "postgres:16",
    }
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Panel schema with the two seed users
pub fn schema_sql(kind: DatabaseKind, seeds: &SeedAccounts) -> String {
    let admin = format!(
        "({}, {}, 'admin')",
        sql_quote(SEED_ADMIN_EMAIL),
        sql_quote(&seeds.admin_hash)
    );
    let user = format!(
        "({}, {}, 'user')",
        sql_quote(SEED_USER_EMAIL),
        sql_quote(&seeds.user_hash)
    );

    match kind {
        DatabaseKind::Mysql => format!(
            "-- Managed by panelo
CREATE DATABASE IF NOT EXISTS {SCHEMA_NAME};
USE {SCHEMA_NAME};

CREATE TABLE IF NOT EXISTS users (
    id INT AUTO_INCREMENT PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    password VARCHAR(255) NOT NULL,
    role ENUM('admin', 'user') NOT NULL DEFAULT 'user',
    status ENUM('active', 'inactive') NOT NULL DEFAULT 'active',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS applications (
    id INT AUTO_INCREMENT PRIMARY KEY,
    user_id INT NOT NULL,
    name VARCHAR(255) NOT NULL,
    type ENUM('wordpress', 'nodejs', 'php', 'python', 'static') NOT NULL,
    domain VARCHAR(255),
    port INT UNIQUE,
    status ENUM('running', 'stopped', 'creating', 'error') NOT NULL DEFAULT 'creating',
    config JSON,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS domains (
    id INT AUTO_INCREMENT PRIMARY KEY,
    user_id INT NOT NULL,
    domain VARCHAR(255) NOT NULL UNIQUE,
    ssl_enabled BOOLEAN NOT NULL DEFAULT FALSE,
    ssl_cert_path VARCHAR(500),
    ssl_key_path VARCHAR(500),
    status ENUM('pending', 'active', 'failed') NOT NULL DEFAULT 'pending',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

INSERT IGNORE INTO users (email, password, role) VALUES
    {admin},
    {user};
"
        ),
        DatabaseKind::Postgresql => format!(
            "-- Managed by panelo
CREATE SCHEMA IF NOT EXISTS {SCHEMA_NAME};
SET search_path TO {SCHEMA_NAME};

CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    password VARCHAR(255) NOT NULL,
    role VARCHAR(10) NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
    status VARCHAR(10) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS applications (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name VARCHAR(255) NOT NULL,
    type VARCHAR(20) NOT NULL CHECK (type IN ('wordpress', 'nodejs', 'php', 'python', 'static')),
    domain VARCHAR(255),
    port INTEGER UNIQUE,
    status VARCHAR(10) NOT NULL DEFAULT 'creating'
        CHECK (status IN ('running', 'stopped', 'creating', 'error')),
    config JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS domains (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    domain VARCHAR(255) NOT NULL UNIQUE,
    ssl_enabled BOOLEAN NOT NULL DEFAULT FALSE,
    ssl_cert_path VARCHAR(500),
    ssl_key_path VARCHAR(500),
    status VARCHAR(10) NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'active', 'failed')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

INSERT INTO users (email, password, role) VALUES
    {admin},
    {user}
ON CONFLICT (email) DO NOTHING;
"
        ),
    }
}

/// Container specification of the configured engine
pub fn container_spec(ctx: &ProvisionContext, root_password: &str) -> ContainerSpec {
    let kind = ctx.config().database;
    let network = ctx.config().settings.network.clone();
    let published = format!("127.0.0.1:{0}:{0}", port(kind));
    let spec = ContainerSpec::new(container_name(kind), image(kind))
        .network(network)
        .publish(published);
    match kind {
        DatabaseKind::Mysql => spec
            .env("MYSQL_ROOT_PASSWORD", root_password)
            .volume(ctx.paths().data("mysql"), "/var/lib/mysql"),
        DatabaseKind::Postgresql => spec
            .env("POSTGRES_PASSWORD", root_password)
            .volume(ctx.paths().data("postgresql"), "/var/lib/postgresql/data"),
    }
}

/// Command that succeeds once the engine accepts connections
pub fn readiness_probe(kind: DatabaseKind, root_password: &str) -> Command {
    match kind {
        DatabaseKind::Mysql => docker::exec(
            container_name(kind),
            &[("MYSQL_PWD", root_password)],
            false,
            &["mysqladmin", "ping", "-h", "127.0.0.1", "-uroot", "--silent"],
        ),
        DatabaseKind::Postgresql => docker::exec(
            container_name(kind),
            &[],
            false,
            &["pg_isready", "-U", "postgres"],
        ),
    }
}

/// Run SQL through the engine's client inside the container
pub fn sql_command(kind: DatabaseKind, root_password: &str, sql: impl Into<Vec<u8>>) -> Command {
    let mut cmd = match kind {
        DatabaseKind::Mysql => docker::exec(
            container_name(kind),
            &[("MYSQL_PWD", root_password)],
            true,
            &["mysql", "-uroot"],
        ),
        DatabaseKind::Postgresql => docker::exec(
            container_name(kind),
            &[],
            true,
            &["psql", "-U", "postgres", "-v", "ON_ERROR_STOP=1"],
        ),
    };
    cmd.stdin_bytes(sql);
    cmd
}

/// Database engine container with the panel schema
pub struct DatabaseComponent;

impl DatabaseComponent {
    fn schema_path(ctx: &ProvisionContext) -> std::path::PathBuf {
        ctx.paths().install("database/schema.sql")
    }
}

#[async_trait]
impl Component for DatabaseComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Database
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let name = container_name(ctx.config().database);
        match docker::container_state(ctx, name).await? {
            None => Ok(ComponentState::Absent),
            Some(state) if !state.is_running => {
                Ok(ComponentState::Drifted(format!("{} is {}", name, state.state)))
            }
            Some(_) if !Self::schema_path(ctx).exists() => {
                Ok(ComponentState::Drifted("schema not applied".to_string()))
            }
            Some(_) => Ok(ComponentState::Present),
        }
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let kind = ctx.config().database;
        let root_password = credentials::database_root_password(ctx)?;
        let seeds = credentials::ensure_seed_accounts(ctx)?;

        let spec = container_spec(ctx, &root_password);
        docker::ensure_image(ctx, &spec.image, rec).await?;
        for (host_dir, _) in &spec.volumes {
            fs::create_dir_all(host_dir)?;
        }
        let created = docker::ensure_container(ctx, &spec, rec).await?;

        wait_for(
            ctx,
            &format!("{} database", kind.as_str()),
            &readiness_probe(kind, &root_password),
        )
        .await?;

        // schema.sql records the last schema the engine accepted
        let sql = schema_sql(kind, &seeds);
        let path = Self::schema_path(ctx);
        let recorded = FileSet::new().file(&path, sql.as_str(), 0o600).diff()?.is_empty();
        let pending = created || !recorded;
        if pending {
            ctx.run(&sql_command(kind, &root_password, sql.as_str())).await?;
            info!("Applied {} schema", SCHEMA_NAME);
            rec.note(format!("applied {} schema", SCHEMA_NAME));
        }
        FileSet::ensure(path, sql, 0o600, rec)?;
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::start_container(ctx, container_name(ctx.config().database)).await
    }

    async fn stop(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::stop_container(ctx, container_name(ctx.config().database)).await
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        super::containers_status(ctx, &[container_name(ctx.config().database)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> SeedAccounts {
        SeedAccounts {
            admin_hash: "$argon2id$v=19$m=19456,t=2,p=1$YWJj$ZGVm".to_string(),
            user_hash: "it's-quoted".to_string(),
        }
    }

    #[test]
    fn test_mysql_schema() {
        let sql = schema_sql(DatabaseKind::Mysql, &seeds());
        assert!(sql.contains("CREATE DATABASE IF NOT EXISTS server_panel;"));
        for table in ["users", "applications", "domains"] {
            assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)));
        }
        assert_eq!(sql.matches("ON DELETE CASCADE").count(), 2);
        assert!(sql.contains("INSERT IGNORE INTO users"));
        assert!(sql.contains("'it''s-quoted'"));
    }

    #[test]
    fn test_postgres_schema() {
        let sql = schema_sql(DatabaseKind::Postgresql, &seeds());
        assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS server_panel;"));
        assert!(sql.contains("ON CONFLICT (email) DO NOTHING;"));
        assert!(!sql.contains("INSERT IGNORE"));
    }

    #[test]
    fn test_probe_passes_password_by_env() {
        let probe = readiness_probe(DatabaseKind::Mysql, "s3cret");
        assert_eq!(
            probe.display(),
            "docker exec -e MYSQL_PWD=s3cret panelo-mysql mysqladmin ping -h 127.0.0.1 -uroot --silent"
        );
    }
}
