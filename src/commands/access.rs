//! Access gate commands: setup, token, output directory, allow-list, permissions.

use super::{Context, Output, json};
use crate::access::{Permissions, generate_token};
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

fn save_failed(what: &str) -> Error {
    Error::ConfigIo(format!("Failed to save {}; see log for details", what))
}

fn non_empty(token: &str) -> Result<&str> {
    if token.trim().is_empty() {
        Err(Error::InvalidInput("Access token cannot be empty".to_string()))
    } else {
        Ok(token)
    }
}

#[derive(Serialize)]
pub struct SetupResult {
    pub output_path: PathBuf,
    pub allowed_directories: Vec<PathBuf>,
    /// Only present when the token was generated by this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Output for SetupResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Output directory: {}", self.output_path.display())];
        for dir in &self.allowed_directories {
            lines.push(format!("Allowed: {}", dir.display()));
        }
        if let Some(token) = &self.token {
            lines.push(format!("Access token (shown once, store it safely): {}", token));
        }
        lines.join("\n")
    }
}

/// Configure the gate: output directory, token, read/write permissions.
///
/// On a fresh gate the token comes from `--token` or is generated and
/// returned once. Re-running setup on a configured gate requires the current
/// token and keeps it.
pub fn setup(ctx: &Context, output: &Path) -> Result<SetupResult> {
    let mut gate = ctx.open_gate();

    let (raw, generated) = if gate.has_token() {
        ctx.authorize(&gate)?;
        (ctx.token().unwrap_or_default().to_string(), false)
    } else {
        match ctx.token() {
            Some(t) => (non_empty(t)?.to_string(), false),
            None => (generate_token(), true),
        }
    };

    if !gate.configure(output, &raw) {
        return Err(save_failed("access configuration"));
    }
    let output_path = gate
        .output_path()
        .map(Path::to_path_buf)
        .ok_or(Error::NotConfigured)?;

    let permissions = Permissions {
        can_read_files: true,
        can_write_files: true,
        can_execute_commands: false,
        allowed_directories: vec![output_path.clone()],
    };
    if !gate.set_permissions(permissions) {
        return Err(save_failed("permissions"));
    }

    tracing::info!("Setup complete, output directory {}", output_path.display());
    Ok(SetupResult {
        output_path,
        allowed_directories: gate.permissions().allowed_directories.clone(),
        token: generated.then_some(raw),
    })
}

#[derive(Serialize)]
pub struct TokenSetResult {
    pub updated: bool,
}

impl Output for TokenSetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        "Access token updated".to_string()
    }
}

/// Replace the access token. Requires the current one.
pub fn token_set(ctx: &Context, new_token: &str) -> Result<TokenSetResult> {
    let mut gate = ctx.open_gate();
    ctx.authorize(&gate)?;
    if !gate.set_access_token(non_empty(new_token)?) {
        return Err(save_failed("access token"));
    }
    Ok(TokenSetResult { updated: true })
}

#[derive(Serialize)]
pub struct TokenVerifyResult {
    pub valid: bool,
}

impl Output for TokenVerifyResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        "Token is valid".to_string()
    }
}

/// Check the supplied token. An invalid token is an `AccessDenied` error.
pub fn token_verify(ctx: &Context) -> Result<TokenVerifyResult> {
    ctx.authorize(&ctx.open_gate())?;
    Ok(TokenVerifyResult { valid: true })
}

#[derive(Serialize)]
pub struct OutputSetResult {
    pub output_path: PathBuf,
}

impl Output for OutputSetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Output directory set to {}", self.output_path.display())
    }
}

pub fn output_set(ctx: &Context, dir: &Path) -> Result<OutputSetResult> {
    let mut gate = ctx.open_gate();
    ctx.authorize(&gate)?;
    if !gate.set_output_path(dir) {
        return Err(save_failed("output directory"));
    }
    Ok(OutputSetResult {
        output_path: gate
            .output_path()
            .map(Path::to_path_buf)
            .ok_or(Error::NotConfigured)?,
    })
}

#[derive(Serialize)]
pub struct AllowResult {
    pub allowed_directories: Vec<PathBuf>,
}

impl Output for AllowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} allowed director{}:",
            self.allowed_directories.len(),
            if self.allowed_directories.len() == 1 { "y" } else { "ies" }
        )];
        lines.extend(
            self.allowed_directories
                .iter()
                .map(|d| format!("  {}", d.display())),
        );
        lines.join("\n")
    }
}

/// Add a directory to the allow-list.
pub fn allow(ctx: &Context, dir: &Path) -> Result<AllowResult> {
    let mut gate = ctx.open_gate();
    ctx.authorize(&gate)?;
    if !gate.allow_directory(dir) {
        return Err(save_failed("allowed directories"));
    }
    Ok(AllowResult {
        allowed_directories: gate.permissions().allowed_directories.clone(),
    })
}

#[derive(Serialize)]
pub struct PermissionsResult {
    #[serde(flatten)]
    pub permissions: Permissions,
    pub updated: bool,
}

impl Output for PermissionsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let flag = |b: bool| if b { "yes" } else { "no" };
        let p = &self.permissions;
        let mut lines = vec![
            format!("Read files:       {}", flag(p.can_read_files)),
            format!("Write files:      {}", flag(p.can_write_files)),
            format!("Execute commands: {}", flag(p.can_execute_commands)),
        ];
        for dir in &p.allowed_directories {
            lines.push(format!("Allowed: {}", dir.display()));
        }
        lines.join("\n")
    }
}

/// Show the permission set, or update individual flags when any is given.
pub fn permissions(
    ctx: &Context,
    read: Option<bool>,
    write: Option<bool>,
    execute: Option<bool>,
) -> Result<PermissionsResult> {
    let mut gate = ctx.open_gate();
    let updated = read.is_some() || write.is_some() || execute.is_some();

    if updated {
        ctx.authorize(&gate)?;
        let mut next = gate.permissions().clone();
        if let Some(v) = read {
            next.can_read_files = v;
        }
        if let Some(v) = write {
            next.can_write_files = v;
        }
        if let Some(v) = execute {
            next.can_execute_commands = v;
        }
        if !gate.set_permissions(next) {
            return Err(save_failed("permissions"));
        }
    }

    Ok(PermissionsResult {
        permissions: gate.permissions().clone(),
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{TOKEN, configured, context};
    use crate::test_utils::TestEnv;

    #[test]
    fn test_setup_generates_token_once() {
        let env = TestEnv::new();
        let ctx = context(&env, None);
        let result = setup(&ctx, &env.path().join("out")).unwrap();

        let token = result.token.clone().unwrap();
        assert_eq!(token.len(), 64);
        assert!(ctx.open_gate().verify(&token));
        assert!(result.to_json().contains(&token));

        let expected = env.path().canonicalize().unwrap().join("out");
        assert_eq!(result.output_path, expected);
        assert_eq!(result.allowed_directories, vec![expected]);
    }

    #[test]
    fn test_setup_with_supplied_token() {
        let env = TestEnv::new();
        let ctx = configured(&env);
        let gate = ctx.open_gate();
        assert!(gate.verify(TOKEN));
        assert!(gate.permissions().can_read_files);
        assert!(gate.permissions().can_write_files);
        assert!(!gate.permissions().can_execute_commands);
    }

    #[test]
    fn test_setup_supplied_token_not_echoed() {
        let env = TestEnv::new();
        let ctx = context(&env, Some(TOKEN));
        let result = setup(&ctx, &env.path().join("out")).unwrap();
        assert!(result.token.is_none());
        assert!(!result.to_json().contains(TOKEN));
    }

    #[test]
    fn test_rerun_setup_requires_token() {
        let env = TestEnv::new();
        configured(&env);

        let intruder = context(&env, Some("guess"));
        assert!(matches!(
            setup(&intruder, &env.path().join("elsewhere")),
            Err(Error::AccessDenied)
        ));
        let anonymous = context(&env, None);
        assert!(matches!(
            setup(&anonymous, &env.path().join("elsewhere")),
            Err(Error::AccessDenied)
        ));

        let owner = context(&env, Some(TOKEN));
        let result = setup(&owner, &env.path().join("elsewhere")).unwrap();
        assert!(result.token.is_none());
        assert!(result.output_path.ends_with("elsewhere"));
        assert!(owner.open_gate().verify(TOKEN));
    }

    #[test]
    fn test_token_set_and_verify() {
        let env = TestEnv::new();
        let ctx = configured(&env);
        assert!(token_verify(&ctx).unwrap().valid);

        token_set(&ctx, "rotated").unwrap();
        assert!(matches!(token_verify(&ctx), Err(Error::AccessDenied)));
        assert!(token_verify(&context(&env, Some("rotated"))).is_ok());
    }

    #[test]
    fn test_token_set_rejects_empty() {
        let env = TestEnv::new();
        let ctx = configured(&env);
        assert!(matches!(token_set(&ctx, "  "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_token_verify_unconfigured() {
        let env = TestEnv::new();
        let ctx = context(&env, Some(TOKEN));
        assert!(matches!(token_verify(&ctx), Err(Error::NotConfigured)));
    }

    #[test]
    fn test_allow_and_output_set() {
        let env = TestEnv::new();
        let ctx = configured(&env);

        let result = allow(&ctx, &env.path().join("shared")).unwrap();
        assert_eq!(result.allowed_directories.len(), 2);
        let again = allow(&ctx, &env.path().join("shared")).unwrap();
        assert_eq!(again.allowed_directories.len(), 2);

        let out = output_set(&ctx, &env.path().join("new-out")).unwrap();
        assert!(out.output_path.is_dir());
    }

    #[test]
    fn test_permissions_show_and_update() {
        let env = TestEnv::new();
        let ctx = configured(&env);

        let shown = permissions(&context(&env, None), None, None, None).unwrap();
        assert!(!shown.updated);
        assert!(shown.permissions.can_write_files);

        assert!(matches!(
            permissions(&context(&env, None), None, Some(false), None),
            Err(Error::AccessDenied)
        ));

        let updated = permissions(&ctx, None, Some(false), Some(true)).unwrap();
        assert!(updated.updated);
        assert!(updated.permissions.can_read_files);
        assert!(!updated.permissions.can_write_files);
        assert!(updated.permissions.can_execute_commands);

        let json: serde_json::Value = serde_json::from_str(&updated.to_json()).unwrap();
        assert_eq!(json["can_write_files"], false);
        assert_eq!(json["allowed_directories"].as_array().unwrap().len(), 1);
    }
}
