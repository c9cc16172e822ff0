//! PIN-gated scratch notes.
//!
//! The vault is a privacy curtain, not a security boundary: the PIN is a
//! salted SHA-256 digest in the device-local store, and notes live only in
//! memory for the session. There is no retry limit on PIN entry.
//!
//! Gate states:
//!
//! ```text
//! Locked --unlock (no PIN)--> PinSetup --4 digits--> Unlocked
//! Locked --unlock (PIN set)--> PinEntry --match--> Unlocked
//!                              PinEntry --mismatch--> PinEntry{error} --clear_error--> PinEntry
//! any --lock--> Locked
//! ```

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use lullwave_core::VaultEntryId;

use crate::storage::{LocalStore, StorageError, keys};

/// Number of digits in a vault PIN.
pub const PIN_LENGTH: usize = 4;

/// How long the UI shows a mismatch before calling [`Vault::clear_error`].
pub const ERROR_RESET_DELAY: Duration = Duration::from_millis(800);

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,

    #[error("cannot save an empty note")]
    EmptyContent,

    #[error("no note is open in the editor")]
    NotEditing,

    #[error("note not found: {0}")]
    NotFound(VaultEntryId),

    #[error("no burn is pending")]
    NoPendingBurn,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Where the gate currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Locked,
    /// No PIN stored yet; the next four digits become the PIN.
    PinSetup,
    /// Comparing input against the stored PIN. `error` is set after a
    /// mismatch until [`VaultGate::clear_error`] or the next digit.
    PinEntry { error: bool },
    Unlocked,
}

/// Result of a single keypad press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Digit accepted; this many digits are entered.
    Entered(usize),
    /// The PIN was just created and the vault is open.
    PinSet,
    Unlocked,
    Mismatch,
    /// Press ignored (not a digit, or the gate isn't taking input).
    Ignored,
}

/// Four-digit PIN gate backed by the device-local store.
pub struct VaultGate {
    store: Arc<dyn LocalStore>,
    state: GateState,
    input: String,
    failed_attempts: u32,
}

impl VaultGate {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            state: GateState::Locked,
            input: String::with_capacity(PIN_LENGTH),
            failed_attempts: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        matches!(self.state, GateState::Unlocked)
    }

    /// Digits entered so far, for rendering the dots.
    #[must_use]
    pub const fn entered(&self) -> usize {
        self.input.len()
    }

    /// Mismatches since the gate was created. Diagnostics only.
    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    #[must_use]
    pub fn has_pin(&self) -> bool {
        self.store.get(keys::VAULT_PIN).is_some()
    }

    /// Begin an unlock attempt from `Locked`.
    pub fn unlock(&mut self) -> GateState {
        if self.state == GateState::Locked {
            self.input.clear();
            self.state = if self.has_pin() {
                GateState::PinEntry { error: false }
            } else {
                GateState::PinSetup
            };
        }
        self.state
    }

    /// Feed one keypad press.
    ///
    /// # Errors
    ///
    /// Returns an error only if a new PIN cannot be persisted.
    pub fn press_digit(&mut self, digit: char) -> Result<PinOutcome, VaultError> {
        if !digit.is_ascii_digit() {
            return Ok(PinOutcome::Ignored);
        }
        match self.state {
            GateState::PinEntry { error: true } => self.clear_error(),
            GateState::PinSetup | GateState::PinEntry { error: false } => {}
            GateState::Locked | GateState::Unlocked => return Ok(PinOutcome::Ignored),
        }

        self.input.push(digit);
        if self.input.len() < PIN_LENGTH {
            return Ok(PinOutcome::Entered(self.input.len()));
        }

        if self.state == GateState::PinSetup {
            let digest = hash_pin(&self.input, &random_salt());
            self.store.set(keys::VAULT_PIN, &digest)?;
            self.input.clear();
            self.state = GateState::Unlocked;
            info!("Vault PIN created");
            return Ok(PinOutcome::PinSet);
        }

        let matches = self
            .store
            .get(keys::VAULT_PIN)
            .is_some_and(|stored| verify_pin(&self.input, &stored));
        if matches {
            self.input.clear();
            self.state = GateState::Unlocked;
            debug!("Vault unlocked");
            Ok(PinOutcome::Unlocked)
        } else {
            // Input stays full so the UI can flash it until clear_error
            self.failed_attempts = self.failed_attempts.saturating_add(1);
            self.state = GateState::PinEntry { error: true };
            debug!(failed_attempts = self.failed_attempts, "Vault PIN mismatch");
            Ok(PinOutcome::Mismatch)
        }
    }

    pub fn backspace(&mut self) {
        if matches!(
            self.state,
            GateState::PinSetup | GateState::PinEntry { error: false }
        ) {
            self.input.pop();
        }
    }

    /// Leave the error flash and clear the input.
    pub fn clear_error(&mut self) {
        if self.state == (GateState::PinEntry { error: true }) {
            self.input.clear();
            self.state = GateState::PinEntry { error: false };
        }
    }

    pub fn lock(&mut self) {
        self.input.clear();
        self.state = GateState::Locked;
    }

    /// Forget the stored PIN so the next unlock runs setup again.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless the gate is open.
    pub fn reset_pin(&mut self) -> Result<(), VaultError> {
        if !self.is_unlocked() {
            return Err(VaultError::Locked);
        }
        self.store.remove(keys::VAULT_PIN)?;
        info!("Vault PIN reset");
        Ok(())
    }
}

fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    salt
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

/// `salt_hex:sha256(salt || pin)_hex`
fn hash_pin(pin: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    format!("{}:{}", to_hex(salt), to_hex(&hasher.finalize()))
}

fn verify_pin(pin: &str, stored: &str) -> bool {
    let Some((salt_hex, _)) = stored.split_once(':') else {
        return false;
    };
    let salt: Option<Vec<u8>> = (0..salt_hex.len())
        .step_by(2)
        .map(|i| {
            salt_hex
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect();
    salt.is_some_and(|salt| hash_pin(pin, &salt) == stored)
}

/// A session-local note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEntry {
    pub id: VaultEntryId,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// What the vault surface is showing once unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorView {
    List,
    /// `id` is `None` for a note that hasn't been saved yet.
    Editor {
        id: Option<VaultEntryId>,
        draft: String,
    },
}

/// The gate plus the notes behind it.
pub struct Vault {
    gate: VaultGate,
    entries: Vec<VaultEntry>,
    view: EditorView,
    pending_burn: Option<VaultEntryId>,
}

impl Vault {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            gate: VaultGate::new(store),
            entries: Vec::new(),
            view: EditorView::List,
            pending_burn: None,
        }
    }

    #[must_use]
    pub const fn gate(&self) -> &VaultGate {
        &self.gate
    }

    pub fn unlock(&mut self) -> GateState {
        self.gate.unlock()
    }

    /// # Errors
    ///
    /// See [`VaultGate::press_digit`].
    pub fn press_digit(&mut self, digit: char) -> Result<PinOutcome, VaultError> {
        self.gate.press_digit(digit)
    }

    pub fn backspace(&mut self) {
        self.gate.backspace();
    }

    pub fn clear_error(&mut self) {
        self.gate.clear_error();
    }

    /// Close the vault, discarding the open editor and any pending burn.
    pub fn lock(&mut self) {
        self.gate.lock();
        self.view = EditorView::List;
        self.pending_burn = None;
    }

    /// # Errors
    ///
    /// See [`VaultGate::reset_pin`].
    pub fn reset_pin(&mut self) -> Result<(), VaultError> {
        self.gate.reset_pin()
    }

    /// Notes, newest first. Empty while locked.
    #[must_use]
    pub fn entries(&self) -> &[VaultEntry] {
        if self.gate.is_unlocked() {
            &self.entries
        } else {
            &[]
        }
    }

    #[must_use]
    pub const fn view(&self) -> &EditorView {
        &self.view
    }

    #[must_use]
    pub const fn pending_burn(&self) -> Option<VaultEntryId> {
        self.pending_burn
    }

    fn ensure_unlocked(&self) -> Result<(), VaultError> {
        if self.gate.is_unlocked() {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    /// Open the editor on a blank note.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] if the gate is closed.
    pub fn open_new(&mut self) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        self.view = EditorView::Editor {
            id: None,
            draft: String::new(),
        };
        Ok(())
    }

    /// Open the editor on an existing note.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] or [`VaultError::NotFound`].
    pub fn open(&mut self, id: VaultEntryId) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(VaultError::NotFound(id))?;
        self.view = EditorView::Editor {
            id: Some(id),
            draft: entry.content.clone(),
        };
        Ok(())
    }

    /// Save the open note and return to the list.
    ///
    /// New notes go to the front of the list. Whitespace-only content is
    /// rejected and nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`], [`VaultError::NotEditing`],
    /// [`VaultError::EmptyContent`], or [`VaultError::NotFound`] if the note
    /// being edited was burned meanwhile.
    pub fn save(&mut self, content: &str) -> Result<VaultEntryId, VaultError> {
        self.ensure_unlocked()?;
        let EditorView::Editor { id, .. } = &self.view else {
            return Err(VaultError::NotEditing);
        };
        if content.trim().is_empty() {
            return Err(VaultError::EmptyContent);
        }

        let id = match *id {
            Some(id) => {
                let entry = self
                    .entries
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or(VaultError::NotFound(id))?;
                content.clone_into(&mut entry.content);
                entry.updated_at = Utc::now();
                id
            }
            None => {
                let entry = VaultEntry {
                    id: VaultEntryId::new(),
                    content: content.to_string(),
                    updated_at: Utc::now(),
                };
                let id = entry.id;
                self.entries.insert(0, entry);
                id
            }
        };

        self.view = EditorView::List;
        Ok(id)
    }

    /// Leave the editor without saving.
    pub fn close_editor(&mut self) {
        self.view = EditorView::List;
    }

    /// Ask for confirmation before burning a note.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] or [`VaultError::NotFound`].
    pub fn request_burn(&mut self, id: VaultEntryId) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        if !self.entries.iter().any(|e| e.id == id) {
            return Err(VaultError::NotFound(id));
        }
        self.pending_burn = Some(id);
        Ok(())
    }

    /// Destroy the note awaiting confirmation. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`], [`VaultError::NoPendingBurn`], or
    /// [`VaultError::NotFound`].
    pub fn confirm_burn(&mut self) -> Result<VaultEntry, VaultError> {
        self.ensure_unlocked()?;
        let id = self.pending_burn.take().ok_or(VaultError::NoPendingBurn)?;
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(VaultError::NotFound(id))?;
        if matches!(&self.view, EditorView::Editor { id: Some(open), .. } if *open == id) {
            self.view = EditorView::List;
        }
        Ok(self.entries.remove(index))
    }

    pub fn cancel_burn(&mut self) {
        self.pending_burn = None;
    }
}
