//! Placeholder API and dashboard services

use super::database;
use super::web_server::{API_PORT, DASHBOARD_PORT};
use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::docker::{self, ContainerSpec};
use crate::readiness::wait_for;
use crate::reconciler::{FileSet, StepRecorder};
use crate::Result;
use async_trait::async_trait;
use command_executor::Command;
use std::path::PathBuf;
use tracing::info;

/// API container
pub const API_CONTAINER: &str = "panelo-api";

/// Dashboard container
pub const DASHBOARD_CONTAINER: &str = "panelo-dashboard";

const API_PACKAGE: &str = r#"{
  "name": "panelo-api",
  "version": "1.0.0",
  "private": true,
  "scripts": {
    "start": "node server.js"
  },
  "dependencies": {
    "express": "^4.18.2"
  }
}
"#;

const API_SERVER: &str = r#"// Managed by panelo
const express = require('express');
const os = require('os');

const app = express();
app.use(express.json());
const port = process.env.PORT || 3001;

app.post('/api/auth/login', (req, res) => {
  const { email, password } = req.body || {};
  if (!email || !password) {
    return res.status(400).json({ error: 'email and password are required' });
  }
  res.json({ token: 'placeholder', user: { email } });
});

app.get('/api/system/info', (req, res) => {
  res.json({
    hostname: os.hostname(),
    platform: os.platform(),
    uptime: os.uptime(),
    loadavg: os.loadavg(),
    memory: { total: os.totalmem(), free: os.freemem() },
    database: { host: process.env.DB_HOST, name: process.env.DB_NAME },
  });
});

app.get('/api/applications', (req, res) => res.json([]));

app.get('/api/health', (req, res) => res.json({ status: 'ok' }));

app.listen(port, () => console.log(`panelo api listening on ${port}`));
"#;

const API_DOCKERFILE: &str = "FROM node:18-alpine
WORKDIR /app
COPY package.json ./
RUN npm install --omit=dev
COPY server.js ./
EXPOSE 3001
CMD [\"npm\", \"start\"]
";

const DASHBOARD_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>panelo</title>
  <style>
    body { font-family: sans-serif; max-width: 40rem; margin: 3rem auto; }
    li { margin: 0.5rem 0; }
  </style>
</head>
<body>
  <h1>panelo</h1>
  <ul id="links"></ul>
  <script>
    const host = window.location.hostname;
    const links = [
      ['API health', '/api/health'],
      ['System info', '/api/system/info'],
      ['File browser', `http://${host}:8080`],
      ['Prometheus', `http://${host}:9090`],
    ];
    const list = document.getElementById('links');
    for (const [label, href] of links) {
      const item = document.createElement('li');
      item.innerHTML = `<a href="${href}">${label}</a>`;
      list.appendChild(item);
    }
  </script>
</body>
</html>
"#;

const DASHBOARD_DOCKERFILE: &str = "FROM nginx:alpine
COPY index.html /usr/share/nginx/html/index.html
EXPOSE 80
";

struct Service {
    container: &'static str,
    image: &'static str,
    dir: PathBuf,
    files: FileSet,
}

fn services(ctx: &ProvisionContext) -> [Service; 2] {
    let api_dir = ctx.paths().install("panel/api");
    let dashboard_dir = ctx.paths().install("panel/dashboard");
    [
        Service {
            container: API_CONTAINER,
            image: "panelo/api:latest",
            files: FileSet::new()
                .file(api_dir.join("package.json"), API_PACKAGE, 0o644)
                .file(api_dir.join("server.js"), API_SERVER, 0o644)
                .file(api_dir.join("Dockerfile"), API_DOCKERFILE, 0o644),
            dir: api_dir,
        },
        Service {
            container: DASHBOARD_CONTAINER,
            image: "panelo/dashboard:latest",
            files: FileSet::new()
                .file(dashboard_dir.join("index.html"), DASHBOARD_PAGE, 0o644)
                .file(dashboard_dir.join("Dockerfile"), DASHBOARD_DOCKERFILE, 0o644),
            dir: dashboard_dir,
        },
    ]
}

fn container_spec(ctx: &ProvisionContext, service: &Service) -> ContainerSpec {
    let network = ctx.config().settings.network.clone();
    let spec = ContainerSpec::new(service.container, service.image).network(network);
    if service.container == API_CONTAINER {
        spec.publish(format!("{0}:{0}", API_PORT))
            .env("PORT", API_PORT.to_string())
            .env("DB_HOST", database::container_name(ctx.config().database))
            .env("DB_NAME", database::SCHEMA_NAME)
    } else {
        spec.publish(format!("{}:80", DASHBOARD_PORT))
    }
}

/// Command that succeeds once the API answers its health check
pub fn health_probe() -> Command {
    Command::builder("curl")
        .args(["-fsS", "--max-time", "5"])
        .arg(format!("http://127.0.0.1:{}/api/health", API_PORT))
        .build()
}

/// Panel API and dashboard
pub struct PanelComponent;

#[async_trait]
impl Component for PanelComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Panel
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        for service in services(ctx) {
            if !service.files.diff()?.is_empty() {
                return Ok(ComponentState::Drifted(format!(
                    "{} build context differs",
                    service.container
                )));
            }
        }
        Ok(match self.status(ctx).await? {
            ComponentStatus::Running => ComponentState::Present,
            ComponentStatus::NotInstalled => ComponentState::Absent,
            other => ComponentState::Drifted(other.to_string()),
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        for service in services(ctx) {
            let changed = !service.files.apply(rec)?.is_empty();
            let rebuild = changed || !docker::has_image(ctx, service.image).await;
            if rebuild {
                docker::build_image(ctx, service.image, &service.dir).await?;
                rec.note(format!("built {}", service.image));
            }

            let spec = container_spec(ctx, &service);
            let exists = docker::container_state(ctx, service.container).await?.is_some();
            if rebuild && exists {
                info!("Recreating {} with the new image", service.container);
                docker::recreate_container(ctx, &spec, rec).await?;
            } else {
                docker::ensure_container(ctx, &spec, rec).await?;
            }
        }

        wait_for(ctx, "panel API", &health_probe()).await?;
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::start_container(ctx, API_CONTAINER).await?;
        docker::start_container(ctx, DASHBOARD_CONTAINER).await
    }

    async fn stop(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::stop_container(ctx, DASHBOARD_CONTAINER).await?;
        docker::stop_container(ctx, API_CONTAINER).await
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        super::containers_status(ctx, &[API_CONTAINER, DASHBOARD_CONTAINER]).await
    }
}
