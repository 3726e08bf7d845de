//! Deployment templates, one per application kind

use crate::credentials::generate_password;
use crate::{Error, Result};
use panelo_config::AppKind;
use serde_json::json;

/// Where a template's image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Pulled as is
    Pull(String),
    /// Built from the application directory on top of `base`
    Build {
        /// Base image named in the Dockerfile
        base: String,
    },
}

/// Resolved recipe for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTemplate {
    /// Application kind
    pub kind: AppKind,
    /// Framework variant
    pub variant: String,
    /// Image source
    pub image: ImageSource,
    /// Port the application listens on inside the container
    pub container_port: u16,
}

impl AppTemplate {
    /// Variants accepted per kind; the first is the default
    pub fn variants(kind: AppKind) -> &'static [&'static str] {
        match kind {
            AppKind::Wordpress => &["wordpress"],
            AppKind::Php => &["plain", "laravel"],
            AppKind::Nodejs => &["express", "next"],
            AppKind::Python => &["flask", "django", "fastapi"],
            AppKind::Static => &["static"],
        }
    }

    /// Resolve a template; empty variant or version strings select defaults
    pub fn resolve(kind: AppKind, variant: Option<&str>, version: Option<&str>) -> Result<Self> {
        let variants = Self::variants(kind);
        let variant = match variant.map(str::trim).filter(|v| !v.is_empty()) {
            None => variants[0].to_string(),
            Some(v) if variants.contains(&v.to_ascii_lowercase().as_str()) => v.to_ascii_lowercase(),
            // WordPress and static sites have a single flavour; the variant
            // argument is ignored rather than rejected
            Some(_) if variants.len() == 1 => variants[0].to_string(),
            Some(v) => {
                return Err(Error::Config(format!(
                    "unknown {} variant '{}' (expected one of: {})",
                    kind,
                    v,
                    variants.join(", ")
                )));
            }
        };
        Ok(Self::build(kind, variant, version))
    }

    /// Template with default variant and version
    pub fn default_for(kind: AppKind) -> Self {
        Self::build(kind, Self::variants(kind)[0].to_string(), None)
    }

    fn build(kind: AppKind, variant: String, version: Option<&str>) -> Self {
        let version = version.map(str::trim).filter(|v| !v.is_empty());

        let (image, container_port) = match kind {
            AppKind::Wordpress => (
                ImageSource::Pull(format!("wordpress:{}", version.unwrap_or("latest"))),
                80,
            ),
            AppKind::Php => (
                ImageSource::Pull(format!("php:{}-apache", version.unwrap_or("8.2"))),
                80,
            ),
            AppKind::Nodejs => (
                ImageSource::Build {
                    base: format!("node:{}-alpine", version.unwrap_or("18")),
                },
                3000,
            ),
            AppKind::Python => (
                ImageSource::Build {
                    base: format!("python:{}-slim", version.unwrap_or("3.11")),
                },
                8000,
            ),
            AppKind::Static => (ImageSource::Pull("nginx:alpine".to_string()), 80),
        };

        Self {
            kind,
            variant,
            image,
            container_port,
        }
    }

    /// Image that has to be present before building or running
    pub fn base_image(&self) -> &str {
        match &self.image {
            ImageSource::Pull(image) => image,
            ImageSource::Build { base } => base,
        }
    }

    /// Image reference the container runs
    pub fn run_image(&self, container: &str) -> String {
        match &self.image {
            ImageSource::Pull(image) => image.clone(),
            ImageSource::Build { .. } => format!("panelo/{}:latest", container),
        }
    }

    /// Mount point of the application directory inside the container
    ///
    /// Built images carry their sources and mount nothing.
    pub fn mount_point(&self) -> Option<&'static str> {
        match self.kind {
            AppKind::Wordpress | AppKind::Php => Some("/var/www/html"),
            AppKind::Static => Some("/usr/share/nginx/html"),
            AppKind::Nodejs | AppKind::Python => None,
        }
    }

    /// Extra container environment independent of the deployment
    pub fn static_env(&self) -> Vec<(&'static str, &'static str)> {
        match (self.kind, self.variant.as_str()) {
            (AppKind::Php, "laravel") => vec![("APACHE_DOCUMENT_ROOT", "/var/www/html/public")],
            (AppKind::Nodejs, _) => vec![("NODE_ENV", "production"), ("PORT", "3000")],
            (AppKind::Python, _) => vec![("PYTHONUNBUFFERED", "1")],
            _ => vec![],
        }
    }

    /// Dockerfile for built kinds
    pub fn dockerfile(&self) -> Option<String> {
        let ImageSource::Build { base } = &self.image else {
            return None;
        };
        let text = match (self.kind, self.variant.as_str()) {
            (AppKind::Nodejs, "next") => format!(
                "FROM {base}\n\
                 WORKDIR /app\n\
                 COPY package.json ./\n\
                 RUN npm install\n\
                 COPY . .\n\
                 RUN npm run build\n\
                 EXPOSE 3000\n\
                 CMD [\"npm\", \"start\"]\n"
            ),
            (AppKind::Nodejs, _) => format!(
                "FROM {base}\n\
                 WORKDIR /app\n\
                 COPY package.json ./\n\
                 RUN npm install --omit=dev\n\
                 COPY . .\n\
                 EXPOSE 3000\n\
                 CMD [\"npm\", \"start\"]\n"
            ),
            (_, variant) => {
                let cmd = match variant {
                    "fastapi" => {
                        r#"["uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8000"]"#
                    }
                    "django" => r#"["gunicorn", "-b", "0.0.0.0:8000", "app:application"]"#,
                    _ => r#"["gunicorn", "-b", "0.0.0.0:8000", "app:app"]"#,
                };
                format!(
                    "FROM {base}\n\
                     WORKDIR /app\n\
                     COPY requirements.txt ./\n\
                     RUN pip install --no-cache-dir -r requirements.txt\n\
                     COPY . .\n\
                     EXPOSE 8000\n\
                     CMD {cmd}\n"
                )
            }
        };
        Some(text)
    }

    /// Placeholder sources, relative to the application directory
    ///
    /// Callers write these only when the file does not exist yet, so user
    /// content is never replaced.
    pub fn placeholder_sources(&self, name: &str, domain: &str) -> Vec<(&'static str, String)> {
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{name}</title></head>\n\
             <body>\n<h1>{name}</h1>\n<p>Deployed by panelo for {domain}.</p>\n</body>\n</html>\n"
        );
        match (self.kind, self.variant.as_str()) {
            (AppKind::Wordpress, _) => vec![],
            (AppKind::Static, _) => vec![("index.html", page)],
            (AppKind::Php, "laravel") => vec![(
                "public/index.php",
                format!("<?php\necho '<h1>{name}</h1><p>Laravel placeholder for {domain}.</p>';\n"),
            )],
            (AppKind::Php, _) => vec![(
                "index.php",
                format!("<?php\necho '<h1>{name}</h1><p>PHP ' . phpversion() . ' on {domain}.</p>';\n"),
            )],
            (AppKind::Nodejs, "next") => vec![
                (
                    "package.json",
                    package_json(
                        name,
                        json!({"build": "next build", "start": "next start -p 3000"}),
                        json!({"next": "^14.0.0", "react": "^18.2.0", "react-dom": "^18.2.0"}),
                    ),
                ),
                (
                    "pages/index.js",
                    format!(
                        "export default function Home() {{\n  return <h1>{name}</h1>;\n}}\n"
                    ),
                ),
            ],
            (AppKind::Nodejs, _) => vec![
                (
                    "package.json",
                    package_json(
                        name,
                        json!({"start": "node server.js"}),
                        json!({"express": "^4.18.2"}),
                    ),
                ),
                (
                    "server.js",
                    format!(
                        "const express = require('express');\n\
                         const app = express();\n\
                         const port = process.env.PORT || 3000;\n\n\
                         app.get('/', (req, res) => res.send('<h1>{name}</h1>'));\n\
                         app.get('/health', (req, res) => res.json({{ status: 'ok' }}));\n\n\
                         app.listen(port, () => console.log(`{name} listening on ${{port}}`));\n"
                    ),
                ),
            ],
            (AppKind::Python, "fastapi") => vec![
                ("requirements.txt", "fastapi\nuvicorn\n".to_string()),
                (
                    "main.py",
                    format!(
                        "from fastapi import FastAPI\n\n\
                         app = FastAPI()\n\n\n\
                         @app.get(\"/\")\n\
                         def index():\n    return {{\"app\": \"{name}\"}}\n"
                    ),
                ),
            ],
            (AppKind::Python, "django") => vec![
                ("requirements.txt", "django\ngunicorn\n".to_string()),
                (
                    "app.py",
                    format!(
                        "from django.conf import settings\n\
                         from django.core.wsgi import get_wsgi_application\n\
                         from django.http import HttpResponse\n\
                         from django.urls import path\n\n\
                         settings.configure(\n    DEBUG=False,\n    ALLOWED_HOSTS=[\"{domain}\", \"localhost\"],\n    \
                         ROOT_URLCONF=__name__,\n    SECRET_KEY=\"{secret}\",\n)\n\n\n\
                         def index(request):\n    return HttpResponse(\"<h1>{name}</h1>\")\n\n\n\
                         urlpatterns = [path(\"\", index)]\n\
                         application = get_wsgi_application()\n",
                        secret = generate_password(50)
                    ),
                ),
            ],
            (AppKind::Python, _) => vec![
                ("requirements.txt", "flask\ngunicorn\n".to_string()),
                (
                    "app.py",
                    format!(
                        "from flask import Flask\n\n\
                         app = Flask(__name__)\n\n\n\
                         @app.route(\"/\")\n\
                         def index():\n    return \"<h1>{name}</h1>\"\n"
                    ),
                ),
            ],
        }
    }

    /// Description written to `<install_root>/templates/<kind>/template.json`
    pub fn manifest(&self) -> String {
        let image = match &self.image {
            ImageSource::Pull(image) => json!({"pull": image}),
            ImageSource::Build { base } => json!({"build": {"base": base}}),
        };
        let manifest = json!({
            "kind": self.kind.as_str(),
            "variants": Self::variants(self.kind),
            "image": image,
            "container_port": self.container_port,
            "mount": self.mount_point(),
        });
        // Values are plain strings and numbers
        serde_json::to_string_pretty(&manifest).unwrap_or_default() + "\n"
    }
}

fn package_json(name: &str, scripts: serde_json::Value, dependencies: serde_json::Value) -> String {
    let package = json!({
        "name": name,
        "version": "1.0.0",
        "private": true,
        "scripts": scripts,
        "dependencies": dependencies,
    });
    serde_json::to_string_pretty(&package).unwrap_or_default() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_versions() {
        let wp = AppTemplate::resolve(AppKind::Wordpress, Some(""), Some("")).unwrap();
        assert_eq!(wp.run_image("blog-alice"), "wordpress:latest");
        assert_eq!(wp.container_port, 80);

        let php = AppTemplate::resolve(AppKind::Php, None, Some("8.3")).unwrap();
        assert_eq!(php.base_image(), "php:8.3-apache");
        assert_eq!(php.variant, "plain");

        let node = AppTemplate::default_for(AppKind::Nodejs);
        assert_eq!(node.base_image(), "node:18-alpine");
        assert_eq!(node.run_image("api-bob"), "panelo/api-bob:latest");
        assert!(node.dockerfile().unwrap().starts_with("FROM node:18-alpine\n"));
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = AppTemplate::resolve(AppKind::Python, Some("rails"), None).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("flask")));
        // Single-flavour kinds ignore the argument
        assert!(AppTemplate::resolve(AppKind::Static, Some("hugo"), None).is_ok());
    }

    #[test]
    fn test_python_variants_use_matching_server() {
        let fastapi = AppTemplate::resolve(AppKind::Python, Some("fastapi"), None).unwrap();
        assert!(fastapi.dockerfile().unwrap().contains("uvicorn"));
        let sources = fastapi.placeholder_sources("api", "api.example.com");
        assert!(sources.iter().any(|(path, _)| *path == "main.py"));

        let django = AppTemplate::resolve(AppKind::Python, Some("Django"), Some("3.12")).unwrap();
        assert_eq!(django.base_image(), "python:3.12-slim");
        assert!(django.dockerfile().unwrap().contains("app:application"));
    }

    #[test]
    fn test_manifest_is_json() {
        let manifest = AppTemplate::default_for(AppKind::Static).manifest();
        let value: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(value["image"]["pull"], "nginx:alpine");
        assert_eq!(value["mount"], "/usr/share/nginx/html");
    }
}
