use std::process::Stdio;

use log::{debug, warn};
use tokio::process::Command;

use crate::error_handling::types::DispatchError;

/// Garak probe identifiers offered to clients, in display order.
pub const GARAK_PROBES: [&str; 34] = [
    "test.Test",
    "dan.Dan_11_0",
    "dan.Dan_6_0",
    "dan.Dan_6_2",
    "dan.Dan_7_0",
    "dan.Dan_8_0",
    "dan.Dan_9_0",
    "dan.Dan_10_0",
    "continuation.ContinueSlursReclaimedSlurs",
    "continuation.ContinueSlursReclaimedSlurs_ko",
    "promptinject.PromptInjectClassifier",
    "promptinject.PromptInjectGCG",
    "realtoxicityprompts.RealToxicityPrompts",
    "malwaregen.Malwaregen",
    "xss.XSS",
    "latentinjection.LatentInjection",
    "encoding.InjectBase64",
    "encoding.InjectUnicode",
    "encoding.InjectROT13",
    "encoding.InjectHex",
    "encoding.InjectMorse",
    "encoding.InjectZalgo",
    "encoding.InjectQwerty",
    "encoding.InjectBraille",
    "encoding.InjectMirror",
    "encoding.InjectASCII",
    "encoding.InjectUpsideDown",
    "encoding.InjectLeet",
    "encoding.InjectCaesar",
    "encoding.InjectAtbash",
    "exploitation.Exploitation",
    "hijacking.Hijacking",
    "lmrc.Lmrc",
    "packagehallucination.PackageHallucination",
];

pub fn probe_catalog() -> Vec<String> {
    GARAK_PROBES.iter().map(|p| p.to_string()).collect()
}

/// Lists the model tags known to the local Ollama installation.
#[derive(Debug, Clone)]
pub struct OllamaCatalog {
    binary: String,
}

impl OllamaCatalog {
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, DispatchError> {
        let output = Command::new(&self.binary)
            .arg("list")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                warn!("Failed to run {} list: {}", self.binary, e);
                DispatchError::ToolUnavailable(format!("{}: {}", self.binary, e))
            })?;
        if !output.status.success() {
            return Err(DispatchError::ToolUnavailable(format!(
                "{} list exited with {}",
                self.binary, output.status
            )));
        }
        let models = parse_model_list(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} models", models.len());
        Ok(models)
    }
}

/// Parses `ollama list` output: a header row, then one model per row with
/// the tag in the first column.
pub fn parse_model_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_starts_with_test_probe() {
        let probes = probe_catalog();
        assert_eq!(probes.len(), 34);
        assert_eq!(probes[0], "test.Test");
        assert!(probes.contains(&"dan.Dan_11_0".to_string()));
    }

    #[test]
    fn model_list_skips_header_and_blank_rows() {
        let out = "NAME            ID              SIZE      MODIFIED\n\
                   llama3:latest   365c0bd3c000    4.7 GB    2 days ago\n\
                   \n\
                   gemma:7b        a72c7f4d0a15    5.0 GB    3 weeks ago\n";
        assert_eq!(parse_model_list(out), vec!["llama3:latest", "gemma:7b"]);
    }

    #[test]
    fn empty_output_has_no_models() {
        assert!(parse_model_list("").is_empty());
        assert!(parse_model_list("NAME ID SIZE MODIFIED\n").is_empty());
    }

    #[tokio::test]
    async fn missing_ollama_is_reported() {
        let catalog = OllamaCatalog::new("/nonexistent/ollama-binary");
        assert!(catalog.list_models().await.is_err());
    }
}
