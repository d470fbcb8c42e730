//! Streaming detection of client secrets in outgoing request bodies.
//!
//! A request forwarded to a remote peer must never carry the caller's
//! secrets. The scanner watches the body as an unbounded sequence of
//! chunks with arbitrary boundaries, holding one small cursor per marker
//! and never the body itself.

use std::fmt;

/// The secret field assignments a forwarded body must not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    SecretPhrase,
    AdminPassword,
    SharedKey,
}

impl SecretKind {
    pub const ALL: [SecretKind; 3] = [
        SecretKind::SecretPhrase,
        SecretKind::AdminPassword,
        SecretKind::SharedKey,
    ];

    /// Parameter name, as it appears in a query string.
    pub fn param(self) -> &'static str {
        match self {
            SecretKind::SecretPhrase => "secretPhrase",
            SecretKind::AdminPassword => "adminPassword",
            SecretKind::SharedKey => "sharedKey",
        }
    }

    /// Literal byte marker searched for in request bodies.
    fn marker(self) -> &'static [u8] {
        match self {
            SecretKind::SecretPhrase => b"secretPhrase=",
            SecretKind::AdminPassword => b"adminPassword=",
            SecretKind::SharedKey => b"sharedKey=",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param())
    }
}

/// Single-marker matcher: a cursor into the marker, advanced on match,
/// restarted on mismatch. Not an Aho–Corasick automaton; the markers are
/// fixed literals chosen not to be prefixes of each other, so restart
/// semantics are sufficient.
struct MarkerFinder {
    kind: SecretKind,
    cursor: usize,
}

impl MarkerFinder {
    fn new(kind: SecretKind) -> Self {
        Self { kind, cursor: 0 }
    }

    /// Feed one byte; true when the full marker has been seen.
    fn feed(&mut self, byte: u8) -> bool {
        let marker = self.kind.marker();
        if byte == marker[self.cursor] {
            self.cursor += 1;
            if self.cursor == marker.len() {
                self.cursor = 0;
                return true;
            }
        } else {
            // Restart, re-trying the current byte as a new first byte so
            // a repeated leading character cannot mask the marker.
            self.cursor = if byte == marker[0] { 1 } else { 0 };
        }
        false
    }
}

/// Scans a body one chunk at a time. One instance per in-flight request;
/// once any marker fires the scanner stays detected for the rest of the
/// body.
pub struct SecretScanner {
    finders: [MarkerFinder; 3],
    detected: Option<SecretKind>,
}

impl Default for SecretScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretScanner {
    pub fn new() -> Self {
        Self {
            finders: SecretKind::ALL.map(MarkerFinder::new),
            detected: None,
        }
    }

    /// Scan the next chunk. Returns the detected kind the first time a
    /// marker completes; afterwards keeps reporting it without scanning.
    pub fn scan(&mut self, chunk: &[u8]) -> Option<SecretKind> {
        if self.detected.is_some() {
            return self.detected;
        }
        for &byte in chunk {
            for finder in &mut self.finders {
                if finder.feed(byte) {
                    self.detected = Some(finder.kind);
                    return self.detected;
                }
            }
        }
        None
    }

    pub fn detected(&self) -> Option<SecretKind> {
        self.detected
    }
}
