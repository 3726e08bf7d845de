//! Reverse-proxy virtual hosts

use crate::context::ProvisionContext;
use panelo_config::WebServerKind;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// A virtual host routing a domain to local upstream ports
#[derive(Debug, Clone)]
pub struct Vhost {
    /// Server name (`_` for the catch-all host)
    pub server_name: String,
    /// Location prefix and upstream port, most specific first
    pub routes: Vec<(String, u16)>,
    /// Certificate and key when TLS is served
    pub tls: Option<(PathBuf, PathBuf)>,
    /// Whether this is the default server
    pub default_server: bool,
}

impl Vhost {
    /// Virtual host proxying everything to `port`
    pub fn proxy(server_name: impl Into<String>, port: u16) -> Self {
        Self {
            server_name: server_name.into(),
            routes: vec![("/".to_string(), port)],
            tls: None,
            default_server: false,
        }
    }

    /// Serve TLS with the given certificate and key
    pub fn with_tls(mut self, cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Self {
        self.tls = Some((cert.as_ref().to_path_buf(), key.as_ref().to_path_buf()));
        self
    }

    /// Render for the given web server
    pub fn render(&self, kind: WebServerKind) -> String {
        match kind {
            WebServerKind::Nginx => self.render_nginx(),
            WebServerKind::Apache => self.render_apache(),
        }
    }

    fn render_nginx(&self) -> String {
        let mut out = String::new();
        let default = if self.default_server { " default_server" } else { "" };
        let _ = writeln!(out, "# Managed by panelo; local edits are overwritten");
        let _ = writeln!(out, "server {{");
        let _ = writeln!(out, "    listen 80{};", default);
        let _ = writeln!(out, "    server_name {};", self.server_name);
        if self.tls.is_some() {
            let _ = writeln!(out, "    return 301 https://$host$request_uri;");
            let _ = writeln!(out, "}}");
            let _ = writeln!(out);
            let _ = writeln!(out, "server {{");
            let _ = writeln!(out, "    listen 443 ssl{};", default);
            let _ = writeln!(out, "    server_name {};", self.server_name);
            if let Some((cert, key)) = &self.tls {
                let _ = writeln!(out, "    ssl_certificate {};", cert.display());
                let _ = writeln!(out, "    ssl_certificate_key {};", key.display());
            }
        }
        for (location, port) in &self.routes {
            let _ = writeln!(out);
            let _ = writeln!(out, "    location {} {{", location);
            let _ = writeln!(out, "        proxy_pass http://127.0.0.1:{};", port);
            let _ = writeln!(out, "        proxy_set_header Host $host;");
            let _ = writeln!(out, "        proxy_set_header X-Real-IP $remote_addr;");
            let _ = writeln!(out, "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;");
            let _ = writeln!(out, "        proxy_set_header X-Forwarded-Proto $scheme;");
            let _ = writeln!(out, "    }}");
        }
        let _ = writeln!(out, "}}");
        out
    }

    fn render_apache(&self) -> String {
        let mut out = String::new();
        let server_name = if self.server_name == "_" {
            "localhost"
        } else {
            self.server_name.as_str()
        };
        let _ = writeln!(out, "# Managed by panelo; local edits are overwritten");
        let _ = writeln!(out, "<VirtualHost *:80>");
        let _ = writeln!(out, "    ServerName {}", server_name);
        if self.tls.is_some() {
            let _ = writeln!(out, "    Redirect permanent / https://{}/", server_name);
            let _ = writeln!(out, "</VirtualHost>");
            let _ = writeln!(out);
            let _ = writeln!(out, "<VirtualHost *:443>");
            let _ = writeln!(out, "    ServerName {}", server_name);
            if let Some((cert, key)) = &self.tls {
                let _ = writeln!(out, "    SSLEngine on");
                let _ = writeln!(out, "    SSLCertificateFile {}", cert.display());
                let _ = writeln!(out, "    SSLCertificateKeyFile {}", key.display());
            }
        }
        let _ = writeln!(out, "    ProxyPreserveHost On");
        for (location, port) in &self.routes {
            let _ = writeln!(out, "    ProxyPass {} http://127.0.0.1:{}{}", location, port, location);
            let _ = writeln!(
                out,
                "    ProxyPassReverse {} http://127.0.0.1:{}{}",
                location, port, location
            );
        }
        let _ = writeln!(out, "</VirtualHost>");
        out
    }
}

/// Host path of a managed virtual host file
pub fn vhost_path(ctx: &ProvisionContext, name: &str) -> PathBuf {
    let apache = ctx.config().web_server == WebServerKind::Apache;
    ctx.paths()
        .host(ctx.env().os.vhost_dir(apache))
        .join(format!("{}.conf", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nginx_proxy() {
        let text = Vhost::proxy("blog.example.com", 8100).render(WebServerKind::Nginx);
        assert!(text.contains("server_name blog.example.com;"));
        assert!(text.contains("proxy_pass http://127.0.0.1:8100;"));
        assert!(!text.contains("443"));
    }

    #[test]
    fn test_nginx_tls_redirects() {
        let text = Vhost::proxy("shop.example.com", 8200)
            .with_tls("/etc/letsencrypt/live/shop.example.com/fullchain.pem", "/k.pem")
            .render(WebServerKind::Nginx);
        assert!(text.contains("return 301 https://$host$request_uri;"));
        assert!(text.contains("listen 443 ssl;"));
        assert!(text.contains("ssl_certificate /etc/letsencrypt/live/shop.example.com/fullchain.pem;"));
    }

    #[test]
    fn test_apache_proxy() {
        let text = Vhost::proxy("app.example.com", 3100).render(WebServerKind::Apache);
        assert!(text.contains("<VirtualHost *:80>"));
        assert!(text.contains("ProxyPass / http://127.0.0.1:3100/"));
    }
}
