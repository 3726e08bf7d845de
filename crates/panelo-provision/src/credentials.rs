//! Generated secrets and the credentials file

use crate::context::ProvisionContext;
use crate::reconciler::{FileSet, StepRecorder};
use crate::{Error, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use rand::distributions::Alphanumeric;
use panelo_state::{SEED_ADMIN_EMAIL, SEED_USER_EMAIL};
use tracing::info;

/// Length of generated passwords
pub const PASSWORD_LENGTH: usize = 24;

/// Random alphanumeric password
pub fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Argon2id PHC hash of a password
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Config(format!("password hashing failed: {}", e)))
}

/// Check a password against a PHC hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Database root password, generated and persisted on first use
pub fn database_root_password(ctx: &ProvisionContext) -> Result<String> {
    ctx.store().update(|state| {
        let password = state
            .secrets
            .database_root_password
            .get_or_insert_with(|| generate_password(PASSWORD_LENGTH))
            .clone();
        Ok::<_, Error>(password)
    })
}

/// Seed accounts and their password hashes
#[derive(Debug, Clone)]
pub struct SeedAccounts {
    /// Hash of the administrator password
    pub admin_hash: String,
    /// Hash of the regular seed user's password
    pub user_hash: String,
}

/// Generate the admin password once and seed the two default users in state
///
/// Hashes are persisted with the users, so repeated calls return the same
/// values and the generated schema stays byte-identical.
pub fn ensure_seed_accounts(ctx: &ProvisionContext) -> Result<SeedAccounts> {
    ctx.store().update(|state| {
        let admin_password = match &state.secrets.admin_password {
            Some(password) => password.clone(),
            None => {
                let password = generate_password(PASSWORD_LENGTH);
                state.secrets.admin_password = Some(password.clone());
                password
            }
        };

        if state.user_by_email(SEED_ADMIN_EMAIL).is_none()
            || state.user_by_email(SEED_USER_EMAIL).is_none()
        {
            let admin_hash = hash_password(&admin_password)?;
            let user_hash = hash_password(&generate_password(PASSWORD_LENGTH))?;
            let seeded = state.seed_default_users(&admin_hash, &user_hash);
            info!("Seeded {} default users", seeded);
        }

        let hash_of = |email: &str| {
            state
                .user_by_email(email)
                .map(|u| u.password_hash.clone())
                .ok_or_else(|| Error::NotFound(format!("seed user {}", email)))
        };
        Ok(SeedAccounts {
            admin_hash: hash_of(SEED_ADMIN_EMAIL)?,
            user_hash: hash_of(SEED_USER_EMAIL)?,
        })
    })
}

/// Contents of the credentials file
pub fn render_credentials(ctx: &ProvisionContext, admin_password: &str) -> String {
    let env = ctx.env();
    let mut text = String::new();
    text.push_str("# panelo credentials\n");
    text.push_str(&format!("Dashboard:     http://{}:3000\n", env.domain));
    text.push_str(&format!("API:           http://{}:3001/api\n", env.domain));
    if ctx.config().components.filebrowser {
        text.push_str(&format!("File browser:  http://{}:8080\n", env.domain));
    }
    if ctx.config().components.monitoring {
        text.push_str(&format!("Prometheus:    http://{}:9090\n", env.domain));
    }
    text.push_str(&format!("\nAdmin login:   {}\n", SEED_ADMIN_EMAIL));
    text.push_str(&format!("Admin password: {}\n", admin_password));
    text
}

/// Write the credentials file once, after a successful install
///
/// Returns whether the file was written.
pub fn write_credentials_once(ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<bool> {
    let state = ctx.store().load()?;
    if state.secrets.credentials_written {
        return Ok(false);
    }
    let Some(password) = state.secrets.admin_password.clone() else {
        return Ok(false);
    };

    let path = ctx.paths().credentials_file();
    FileSet::ensure(&path, render_credentials(ctx, &password), 0o600, rec)?;
    ctx.store().update(|state| {
        state.secrets.credentials_written = true;
        Ok::<_, Error>(())
    })?;
    info!("Credentials written to {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_passwords_are_distinct() {
        let a = generate_password(PASSWORD_LENGTH);
        let b = generate_password(PASSWORD_LENGTH);
        assert_eq!(a.len(), PASSWORD_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("correct-horse", "not-a-hash"));
    }
}
