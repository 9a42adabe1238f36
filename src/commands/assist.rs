//! Guarded code operations delegated to the assistant backend.

use super::{Context, Output, json};
use crate::orchestrator::{Explanation, Orchestrator};
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Run `op` and always flush guardian history afterwards.
fn with_orchestrator<T>(ctx: &Context, op: impl FnOnce(&mut Orchestrator) -> Result<T>) -> Result<T> {
    let mut orchestrator = ctx.orchestrator();
    let result = op(&mut orchestrator);
    orchestrator.shutdown();
    result
}

#[derive(Serialize)]
pub struct GenerateResult {
    pub path: Option<PathBuf>,
}

impl Output for GenerateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.path {
            Some(p) => format!("Generated {}", p.display()),
            None => "Nothing generated".to_string(),
        }
    }
}

/// `prompt` may name a file, whose content is then used as the prompt.
pub fn generate(ctx: &Context, prompt: &str, output: Option<&Path>) -> Result<GenerateResult> {
    let prompt_path = Path::new(prompt);
    let prompt = if prompt_path.is_file() {
        fs::read_to_string(prompt_path)?
    } else {
        prompt.to_string()
    };
    let path = with_orchestrator(ctx, |o| o.generate(ctx.token(), &prompt, output))?;
    Ok(GenerateResult { path })
}

#[derive(Serialize)]
pub struct FixResult {
    pub path: PathBuf,
    pub changed: bool,
}

impl Output for FixResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.changed {
            format!("Updated {}", self.path.display())
        } else {
            format!("No changes to {}", self.path.display())
        }
    }
}

pub fn fix(ctx: &Context, file: &Path) -> Result<FixResult> {
    let changed = with_orchestrator(ctx, |o| o.fix(ctx.token(), file))?;
    Ok(FixResult {
        path: file.to_path_buf(),
        changed,
    })
}

pub fn imports(ctx: &Context, file: &Path) -> Result<FixResult> {
    let changed = with_orchestrator(ctx, |o| o.fix_imports(ctx.token(), file))?;
    Ok(FixResult {
        path: file.to_path_buf(),
        changed,
    })
}

#[derive(Serialize)]
pub struct ExplainResult {
    pub path: PathBuf,
    pub lines: Vec<Explanation>,
}

impl Output for ExplainResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.lines
            .iter()
            .map(|e| format!("Line {}: {}\nExplanation: {}\n", e.line, e.code, e.explanation))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn explain(ctx: &Context, file: &Path) -> Result<ExplainResult> {
    let lines = with_orchestrator(ctx, |o| o.explain(ctx.token(), file))?;
    Ok(ExplainResult {
        path: file.to_path_buf(),
        lines,
    })
}
