use anyhow::{Context, Result};
use locallink_core::instruction::{default_system_instruction, render_system_instruction};
use locallink_core::messages::MessageTable;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// File stem of the system instruction override.
pub const SYSTEM_INSTRUCTION_KEY: &str = "system_instruction";

pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}

/// Instruction and message table for a session.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system_instruction: String,
    pub messages: MessageTable,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
            messages: MessageTable::default(),
        }
    }
}

impl PromptSet {
    /// Applies the overrides found in `prompts`. Blank files are ignored.
    pub fn from_prompts(prompts: &HashMap<String, String>) -> Self {
        let system_instruction = match prompts.get(SYSTEM_INSTRUCTION_KEY) {
            Some(template) if !template.trim().is_empty() => {
                render_system_instruction(template.trim())
            }
            _ => default_system_instruction(),
        };
        let overrides: HashMap<String, String> = prompts
            .iter()
            .filter(|(key, text)| key.as_str() != SYSTEM_INSTRUCTION_KEY && !text.trim().is_empty())
            .map(|(key, text)| (key.clone(), text.clone()))
            .collect();
        Self {
            system_instruction,
            messages: MessageTable::with_overrides(&overrides),
        }
    }

    /// Loads `dir`, falling back to the built-in prompts when it can't be read.
    pub fn load_or_default(dir: &Path) -> Self {
        match load_prompts(dir) {
            Ok(prompts) => {
                tracing::info!("Loaded {} prompt overrides from {}", prompts.len(), dir.display());
                Self::from_prompts(&prompts)
            }
            Err(e) => {
                tracing::warn!("Using built-in prompts: {:#}", e);
                Self::default()
            }
        }
    }
}
