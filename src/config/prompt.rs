use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

pub const DEFAULT_THINKER_PROMPT: &str =
    "You are the Thinker, a reasoning AI that analyzes questions and provides structured reasoning.

Your role:
- Analyze the question and determine the reasoning type (deductive, causal, probabilistic, mathematical, or commonsense)
- Break down the question into facts, assumptions, and reasoning steps
- Provide a clear conclusion
- Be concise and logical

Output format (use markdown headers):
## Summary
[one-sentence summary]

## Facts & Assumptions
- [fact 1]
- [fact 2]

## Reasoning
1. [step 1]
2. [step 2]

## Conclusion
[final conclusion]";

pub const DEFAULT_CRITIC_PROMPT: &str =
    "You are the Critic, an evaluator AI that analyzes the Thinker's response and provides an improved solution.

Your role:
- Evaluate the Thinker's response for accuracy, logic, and completeness
- Identify critical flaws
- If the Thinker's solution has major issues, provide a CORRECTED solution
- Be concise and actionable. Don't repeat what works, focus on what's broken

Output format (use markdown headers):
## Verdict
[Valid | Partially Valid | Invalid]

## Key Issues
- [issue 1]
- [issue 2]

## Corrected Solution
[If needed: provide the improved/corrected solution. Work through constraints systematically and give an explicit numbered, step-by-step sequence.]

## Confidence
[High | Medium | Low]";

pub const DEFAULT_JUDGE_PROMPT: &str =
    "You are the Judge. You evaluate BOTH the Thinker's and Critic's responses, then produce a final answer.

Your job:
1. Review the Thinker's reasoning
2. Review the Critic's evaluation and corrected solution
3. Produce ONE polished, user-facing final answer

Output format (use markdown headers):

## User Facing Answer
[Clean, professional answer for the user. No meta-commentary, no explanation of your reasoning. Just the solution.]

## Reasoning
[Your evaluation: What was right/wrong with Thinker? What did Critic improve? Why is the final answer correct?]";

#[derive(Debug)]
pub enum PromptError {
    EmptyPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyPrompt(key) => write!(f, "Prompt '{}' is empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            PromptError::EmptyPrompt(_) => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// System prompts for the three stages. Keys missing from an override file keep their defaults.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub thinker: String,
    pub critic: String,
    pub judge: String,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            thinker: DEFAULT_THINKER_PROMPT.to_string(),
            critic: DEFAULT_CRITIC_PROMPT.to_string(),
            judge: DEFAULT_JUDGE_PROMPT.to_string(),
            last_loaded: None,
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for (key, value) in [
            ("thinker", &self.thinker),
            ("critic", &self.critic),
            ("judge", &self.judge),
        ] {
            if value.trim().is_empty() {
                return Err(PromptError::EmptyPrompt(key.to_string()));
            }
        }
        Ok(())
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let mut config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    config.last_loaded = Some(SystemTime::now());
    info!("Loaded prompts from {}", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Built-in prompts when no path is given, the file's contents otherwise.
pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) => load_prompts(path),
        None => Ok(Arc::new(PromptConfig::default())),
    }
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        match current_config.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Prompts file changed, reloading...");
                return Ok(Some(load_prompts(path)?));
            }
            None => {
                info!("No last_loaded timestamp, reloading prompts...");
                return Ok(Some(load_prompts(path)?));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_carry_judge_section_markers() {
        let config = PromptConfig::default();
        assert!(config.judge.contains("## User Facing Answer"));
        assert!(config.judge.contains("## Reasoning"));
        assert!(config.critic.contains("## Verdict"));
        assert!(config.thinker.contains("## Conclusion"));
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"thinker": "Think hard."}}"#).unwrap();

        let config = load_prompts(file.path()).unwrap();
        assert_eq!(config.thinker, "Think hard.");
        assert_eq!(config.judge, DEFAULT_JUDGE_PROMPT);
        assert!(config.last_loaded.is_some());
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"critic": "   "}}"#).unwrap();

        match load_prompts(file.path()) {
            Err(PromptError::EmptyPrompt(key)) => assert_eq!(key, "critic"),
            other => panic!("expected EmptyPrompt, got {:?}", other),
        }
    }

    #[test]
    fn unchanged_file_is_not_reloaded() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"judge": "Judge it."}}"#).unwrap();

        let current = load_prompts(file.path()).unwrap();
        assert!(reload_prompts_if_changed(file.path(), &current).unwrap().is_none());

        let never_loaded = Arc::new(PromptConfig::default());
        let reloaded = reload_prompts_if_changed(file.path(), &never_loaded).unwrap();
        assert_eq!(reloaded.map(|c| c.judge.clone()).as_deref(), Some("Judge it."));
    }

    #[test]
    fn missing_path_uses_builtins() {
        let config = load_prompts_or_default(None).unwrap();
        assert_eq!(*config, PromptConfig::default());
    }
}
