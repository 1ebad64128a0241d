use coach_core::{ExplanationRequest, MoveDistribution};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::Explainer;
use crate::config::CoachConfig;
use crate::error::ClientError;

#[derive(Serialize)]
struct ExplainBody<'a> {
    fen: &'a str,
    user_move: &'a str,
    best_move: Option<&'a str>,
    move_probs: Option<&'a MoveDistribution>,
}

/// Streaming client for the explanation service.
#[derive(Clone)]
pub struct HttpExplainer {
    client: Client,
    url: Option<String>,
}

impl HttpExplainer {
    pub fn new(config: &CoachConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent("ChessCoach/1.0")
            .timeout(config.explainer_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.explainer_url.clone(),
        })
    }
}

impl Explainer for HttpExplainer {
    async fn explain<F>(&self, request: &ExplanationRequest, mut on_fragment: F) -> Result<(), ClientError>
    where
        F: FnMut(String) + Send,
    {
        let Some(url) = &self.url else {
            return Err(ClientError::NotConfigured("Explanation service"));
        };

        let body = ExplainBody {
            fen: &request.fen,
            user_move: &request.user_move,
            best_move: request.recommended_move.as_deref(),
            move_probs: request.move_distribution.as_ref(),
        };
        debug!(user_move = %request.user_move, "Requesting explanation");

        let resp = self.client.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let mut stream = resp.bytes_stream();
        let mut decoder = Utf8Decoder::default();
        while let Some(chunk) = stream.next().await {
            let text = decoder.push(&chunk?);
            if !text.is_empty() {
                on_fragment(text);
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            on_fragment(rest);
        }
        Ok(())
    }
}

/// Incremental UTF-8 decoding. A character split across chunk boundaries is
/// held back until the rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push_str(&String::from_utf8_lossy(&self.pending[..valid + bad]));
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multibyte_character() {
        let text = "Knight → f3 wins ♞";
        let bytes = text.as_bytes();
        let mut decoder = Utf8Decoder::default();
        let mut out = String::new();
        // One byte at a time splits every multi-byte character
        for b in bytes {
            out.push_str(&decoder.push(std::slice::from_ref(b)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::default();
        let out = decoder.push(&[b'a', 0xff, b'b']);
        assert_eq!(out, "a\u{fffd}b");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_truncated_tail_flushed_lossy() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'x', 0xe2, 0x86]), "x");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }
}
