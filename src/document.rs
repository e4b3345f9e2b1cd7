//! Whole-document model of a chat completion response carrying logprobs.
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One alternative considered at a token position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
}

/// The chosen token at one position with its ranked alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceLogprobs {
    #[serde(default)]
    pub content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub logprobs: Option<ChoiceLogprobs>,
}

/// Top level of the response. Fields other than `choices` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
}

impl ChatCompletion {
    /// Parse a complete document from `reader`.
    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Token entries of the first choice.
    ///
    /// # Examples
    ///
    /// ```
    /// use logprobs::ChatCompletion;
    ///
    /// let doc = r#"{"choices":[{"logprobs":{"content":[{"token":"Hi","logprob":-0.1,"top_logprobs":[]}]}}]}"#;
    /// let completion = ChatCompletion::from_reader(doc.as_bytes()).unwrap();
    /// assert_eq!(completion.content().unwrap()[0].token, "Hi");
    /// ```
    pub fn content(&self) -> anyhow::Result<&[TokenLogprob]> {
        let choice = self.choices.first().context("response has no choices")?;
        let logprobs = choice
            .logprobs
            .as_ref()
            .context("first choice has no logprobs")?;
        let content = logprobs
            .content
            .as_deref()
            .context("logprobs have no content")?;
        Ok(content)
    }
}

/// Load a [`ChatCompletion`] from `path`, or from stdin when `path` is `-`.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<ChatCompletion> {
    let path = path.as_ref();
    if path == Path::new("-") {
        return ChatCompletion::from_reader(std::io::stdin().lock())
            .context("failed to parse stdin");
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    ChatCompletion::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_unknown_fields() {
        let doc = r#"{"id":"x","object":"chat.completion","choices":[{"index":0,
            "message":{"role":"assistant","content":"Hi"},
            "logprobs":{"content":[{"token":"Hi","logprob":-0.1,"bytes":[72,105],
            "top_logprobs":[{"token":"Hi","logprob":-0.1,"bytes":[72,105]}]}],"refusal":null}}]}"#;
        let completion = ChatCompletion::from_reader(doc.as_bytes()).unwrap();
        let content = completion.content().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].bytes.as_deref(), Some(&b"Hi"[..]));
        assert_eq!(content[0].top_logprobs[0].logprob, -0.1);
    }

    #[test]
    fn missing_logprobs_is_an_error() {
        let doc = r#"{"choices":[{"message":{"content":"Hi"}}]}"#;
        let completion = ChatCompletion::from_reader(doc.as_bytes()).unwrap();
        let err = completion.content().unwrap_err();
        assert_eq!(err.to_string(), "first choice has no logprobs");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let completion = ChatCompletion::from_reader(&br#"{"choices":[]}"#[..]).unwrap();
        assert!(completion.content().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load("does/not/exist.json").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }
}
