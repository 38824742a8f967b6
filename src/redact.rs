//! Secret redaction for diagnostic output
//!
//! Everything the process writes to stderr (or to a log file) goes through a
//! [`RedactingWriter`], which replaces each configured secret before the bytes
//! reach the underlying sink.

use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Marker placed between the visible head and tail of a long secret, and the
/// whole replacement for short ones.
pub const MASK: &str = "***";

/// Secrets with more characters than this keep their first and last four.
const REVEAL_THRESHOLD: usize = 8;
const REVEAL_CHARS: usize = 4;

/// Masked form of a secret value.
///
/// ```
/// use agent_payment_router::redact::mask_secret;
///
/// assert_eq!(mask_secret("secret-key-12345"), "secr***2345");
/// assert_eq!(mask_secret("short"), "***");
/// assert_eq!(mask_secret(""), "");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len == 0 {
        return String::new();
    }
    if len <= REVEAL_THRESHOLD {
        return MASK.to_string();
    }

    let head: String = secret.chars().take(REVEAL_CHARS).collect();
    let tail: String = secret.chars().skip(len - REVEAL_CHARS).collect();
    format!("{}{}{}", head, MASK, tail)
}

/// The set of secret values to scrub, paired with their masked form.
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    entries: Arc<[(String, String)]>,
}

impl SecretSet {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<(String, String)> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .map(|s| {
                let masked = mask_secret(&s);
                (s, masked)
            })
            .collect();

        // Longest first, so a secret that contains another one is replaced whole
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        entries.dedup_by(|a, b| a.0 == b.0);

        Self {
            entries: entries.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of every secret in `text`.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (secret, masked) in self.entries.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), masked);
            }
        }
        out
    }
}

/// `io::Write` adapter that redacts each buffer before forwarding it.
///
/// Each `write` call is treated as a unit: the formatter in `logging` emits a
/// whole event per call, so a secret never straddles two buffers.
pub struct RedactingWriter<W: Write> {
    inner: W,
    secrets: SecretSet,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, secrets: SecretSet) -> Self {
        Self { inner, secrets }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.secrets.is_empty() {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }

        let text = String::from_utf8_lossy(buf);
        let redacted = self.secrets.redact(&text);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the caller's length so write_all does not retry the tail
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` that hands `tracing_subscriber` a fresh redacting writer per
/// event.
#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    secrets: SecretSet,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, secrets: SecretSet) -> Self {
        Self { inner, secrets }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), self.secrets.clone())
    }
}
