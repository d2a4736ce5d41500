//! curl invocations with provider auth resolved from a profile snapshot.

use std::collections::HashMap;

use serde_json::json;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Known LLM providers in detection order: `(name, key_var, base_var)`.
/// Ollama runs keyless, so only its base URL is listed.
const PROVIDERS: &[(&str, &str, &str)] = &[
    ("openai", "OPENAI_API_KEY", "OPENAI_BASE_URL"),
    ("anthropic", "ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL"),
    ("groq", "GROQ_API_KEY", "GROQ_BASE_URL"),
    ("mistral", "MISTRAL_API_KEY", "MISTRAL_BASE_URL"),
    ("openrouter", "OPENROUTER_API_KEY", "OPENROUTER_API_BASE"),
    ("deepseek", "DEEPSEEK_API_KEY", "DEEPSEEK_API_BASE"),
    ("gemini", "GEMINI_API_KEY", "GEMINI_API_BASE"),
    ("together_ai", "TOGETHERAI_API_KEY", "TOGETHERAI_API_BASE"),
    ("ollama", "", "OLLAMA_API_BASE"),
    ("azure", "AZURE_API_KEY", "AZURE_API_BASE"),
];

/// Generic auth variables tried when no provider-specific key is present.
const GENERIC_KEYS: &[&str] = &["API_KEY", "AUTH_TOKEN", "TOKEN", "BEARER_TOKEN"];

#[derive(Debug, Clone)]
pub struct CurlEnv {
    data: HashMap<String, String>,
    api_key: String,
    api_base: String,
}

impl CurlEnv {
    /// Resolves auth from the snapshot: the first provider whose key
    /// variable is set wins, then the generic names.
    pub fn new(data: HashMap<String, String>) -> Self {
        let (api_key, api_base) = detect_auth(&data);
        Self {
            data,
            api_key,
            api_base,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Argv for a curl call. Adds a bearer header when a key was detected
    /// and always sends JSON.
    pub fn command(
        &self,
        url: &str,
        method: &str,
        body: Option<&str>,
        headers: &[&str],
    ) -> Vec<String> {
        let mut argv = vec!["curl".to_string(), "-s".to_string()];
        if method != "GET" {
            argv.extend(["-X".to_string(), method.to_string()]);
        }
        if !self.api_key.is_empty() {
            argv.extend([
                "-H".to_string(),
                format!("Authorization: Bearer {}", self.api_key),
            ]);
        }
        argv.extend(["-H".to_string(), "Content-Type: application/json".to_string()]);
        for header in headers {
            argv.extend(["-H".to_string(), header.to_string()]);
        }
        if let Some(body) = body {
            argv.extend(["-d".to_string(), body.to_string()]);
        }
        argv.push(url.to_string());
        argv
    }

    /// Ready-made chat completion request against the detected provider, or
    /// the OpenAI API as a last resort.
    pub fn chat_completion(
        &self,
        message: &str,
        model: Option<&str>,
        api_base: Option<&str>,
    ) -> Vec<String> {
        let base = api_base
            .map(str::to_string)
            .or_else(|| (!self.api_base.is_empty()).then(|| self.api_base.clone()))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let model = model
            .map(str::to_string)
            .or_else(|| self.data.get("LLM_MODEL").cloned())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": message}],
        })
        .to_string();
        self.command(&url, "POST", Some(&payload), &[])
    }
}

fn detect_auth(data: &HashMap<String, String>) -> (String, String) {
    for (_, key_var, base_var) in PROVIDERS {
        if key_var.is_empty() {
            continue;
        }
        if let Some(key) = data.get(*key_var) {
            let base = data.get(*base_var).cloned().unwrap_or_default();
            return (key.clone(), base);
        }
    }
    for name in GENERIC_KEYS {
        if let Some(key) = data.get(*name) {
            return (key.clone(), String::new());
        }
    }
    (String::new(), String::new())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
