//! Encrypted doctor-patient message histories.
//!
//! Each enrollment row owns one append-only message sequence, stored as a
//! JSON array in the row itself. Entries carry the sender, the hex-encoded
//! ciphertext, and a caller-supplied timestamp that is preserved verbatim —
//! the vault neither validates nor orders by it.
//!
//! Retrieval decrypts each entry independently. An entry that fails to
//! decrypt (malformed hex, bad padding, or a value that was stored as
//! plaintext) passes through unchanged rather than poisoning the rest of the
//! history.

use crate::crypto::MessageCipher;
use crate::db::Db;
use crate::error::CoreResult;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One message history entry as stored and as returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub message: String,
    pub timestamp: String,
}

/// Encrypted per-enrollment message log.
#[derive(Clone)]
pub struct MessageVault {
    db: Arc<Db>,
    cipher: MessageCipher,
}

impl MessageVault {
    pub fn new(db: Arc<Db>, cipher: MessageCipher) -> Self {
        Self { db, cipher }
    }

    /// Returns the patient's full decrypted history: all enrollments in
    /// stored order, each enrollment's messages in append order.
    ///
    /// # Errors
    ///
    /// Returns a database error if the enrollment rows cannot be read.
    pub fn get_history(&self, patient_id: &str) -> CoreResult<Vec<Message>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT msg_history FROM enrollments WHERE patient_id = ?1 ORDER BY rowid",
            )?;
            let blobs = stmt
                .query_map([patient_id], |row| row.get::<_, Option<String>>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut messages = Vec::new();
            for blob in blobs {
                for entry in parse_history(blob.as_deref()) {
                    messages.push(self.decrypt_entry(entry));
                }
            }
            Ok(messages)
        })
    }

    /// Encrypts and appends one message to the (doctor, patient) enrollment's
    /// history, rewriting the full sequence.
    ///
    /// Returns the number of affected rows: 0 when no such enrollment exists
    /// (the caller reports not-found), 1 otherwise.
    ///
    /// # Errors
    ///
    /// Returns a database or serialization error if the rewrite fails.
    pub fn append_message(
        &self,
        doctor_id: &str,
        patient_id: &str,
        sender_id: &str,
        plaintext: &str,
        timestamp: &str,
    ) -> CoreResult<usize> {
        let entry = Message {
            sender: sender_id.to_owned(),
            message: self.cipher.encrypt(plaintext),
            timestamp: timestamp.to_owned(),
        };

        self.db.with_tx(|tx| {
            let blob: Option<Option<String>> = tx
                .query_row(
                    "SELECT msg_history FROM enrollments \
                     WHERE doctor_id = ?1 AND patient_id = ?2",
                    params![doctor_id, patient_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(blob) = blob else {
                return Ok(0);
            };

            let mut history = parse_history(blob.as_deref());
            history.push(entry.clone());
            let serialized = serde_json::to_string(&history)?;

            let updated = tx.execute(
                "UPDATE enrollments SET msg_history = ?1 \
                 WHERE doctor_id = ?2 AND patient_id = ?3",
                params![serialized, doctor_id, patient_id],
            )?;
            Ok(updated)
        })
    }

    fn decrypt_entry(&self, entry: Message) -> Message {
        match self.cipher.decrypt(&entry.message) {
            Some(plaintext) => Message {
                message: plaintext,
                ..entry
            },
            None => entry,
        }
    }
}

/// Parses a stored history blob; anything unusable yields an empty history.
fn parse_history(raw: Option<&str>) -> Vec<Message> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}
