//! The Broker signon substitution cipher.
//!
//! ACCESS/VERIFY codes (and, as a fallback, context names) are obfuscated
//! with a table of scrambled alphabets before being sent over the wire.
//! Two table rows are chosen at random per call: each plaintext character
//! is looked up in the first row and replaced by the character at the same
//! position in the second. The chosen row indices travel with the output
//! (offset by 32 into printable ASCII) as its first and last characters,
//! which is how the server inverts the substitution.
//!
//! This is obfuscation for wire parity with legacy clients, not
//! cryptography.

use rand::Rng;

use crate::error::{BrokerError, Result};

/// Offset added to row indices to land them in printable ASCII.
const ROW_INDEX_OFFSET: u8 = 32;

/// An immutable table of scrambled-alphabet rows.
///
/// Constructed once from configuration and passed into each session; there
/// is no process-global table.
#[derive(Debug, Clone)]
pub struct CipherTable {
    rows: Vec<String>,
}

impl CipherTable {
    /// Create a table from its rows.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 2 rows are given or any row is empty: the
    /// cipher needs two distinct rows to index.
    pub fn new(rows: Vec<String>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(BrokerError::InvalidCipherTable(format!(
                "need at least 2 rows, got {}",
                rows.len()
            )));
        }
        if let Some(i) = rows.iter().position(|r| r.is_empty()) {
            return Err(BrokerError::InvalidCipherTable(format!("row {} is empty", i)));
        }
        Ok(Self { rows })
    }

    /// Load a table from an inline JSON array of strings.
    pub fn from_json(raw: &str) -> Result<Self> {
        let rows: Vec<String> = serde_json::from_str(raw)
            .map_err(|e| BrokerError::InvalidCipherTable(format!("bad JSON: {}", e)))?;
        Self::new(rows)
    }

    /// Load a table from newline-delimited file content.
    ///
    /// Blank lines are skipped so trailing newlines do not produce empty
    /// rows.
    pub fn from_lines(raw: &str) -> Result<Self> {
        let rows: Vec<String> = raw
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(rows)
    }

    /// Number of rows in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows. Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encrypt a string with a random row pair.
    ///
    /// The legacy client never picks row 0 as the substitution target, so
    /// neither do we.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut rng = rand::thread_rng();
        let rb = rng.gen_range(1..self.rows.len());
        let ra = loop {
            let candidate = rng.gen_range(0..self.rows.len());
            if candidate != rb {
                break candidate;
            }
        };
        self.encrypt_with_rows(plaintext, ra, rb)
    }

    /// Encrypt with explicit row indices.
    ///
    /// This is useful for testing where you need deterministic output.
    pub fn encrypt_with_rows(&self, plaintext: &str, ra: usize, rb: usize) -> String {
        let from = &self.rows[ra];
        let to = &self.rows[rb];
        let to_chars: Vec<char> = to.chars().collect();

        let mut out = String::with_capacity(plaintext.len() + 2);
        out.push((ra as u8 + ROW_INDEX_OFFSET) as char);
        for c in plaintext.chars() {
            match from.chars().position(|f| f == c) {
                Some(i) if i < to_chars.len() => out.push(to_chars[i]),
                _ => out.push(c),
            }
        }
        out.push((rb as u8 + ROW_INDEX_OFFSET) as char);
        out
    }

    /// Invert an encrypted string using the row indices it carries.
    ///
    /// The server side of the round trip; exposed for tests.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let chars: Vec<char> = encoded.chars().collect();
        if chars.len() < 2 {
            return Err(BrokerError::InvalidCipherTable(
                "encoded string too short to carry row indices".to_string(),
            ));
        }
        let ra = (chars[0] as usize).wrapping_sub(ROW_INDEX_OFFSET as usize);
        let rb = (chars[chars.len() - 1] as usize).wrapping_sub(ROW_INDEX_OFFSET as usize);
        if ra >= self.rows.len() || rb >= self.rows.len() {
            return Err(BrokerError::InvalidCipherTable(format!(
                "row indices {}/{} out of range for {} rows",
                ra,
                rb,
                self.rows.len()
            )));
        }

        // Decryption is the same substitution with the rows swapped.
        let from = &self.rows[rb];
        let to = &self.rows[ra];
        let to_chars: Vec<char> = to.chars().collect();

        let mut out = String::with_capacity(chars.len() - 2);
        for &c in &chars[1..chars.len() - 1] {
            match from.chars().position(|f| f == c) {
                Some(i) if i < to_chars.len() => out.push(to_chars[i]),
                _ => out.push(c),
            }
        }
        Ok(out)
    }
}
