//! Directive Parsing
//!
//! Extracts an optional `#keyword argument` prefix from raw message text.
//!
//! A message is a directive-message iff its first non-whitespace character
//! is `#` immediately followed by a keyword matching
//! `[A-Za-z][A-Za-z0-9_]*`. Everything after the keyword, trimmed, is the
//! argument string.
//!
//! Parsing is pure and total: it never fails and has no side effects.
//! Malformed marker usage (a bare `#`, a marker not at the start, a marker
//! followed by a non-letter) degrades to "no directive" and the text is
//! treated as ordinary chat content.

use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// The character introducing a directive
pub const DIRECTIVE_MARKER: char = '#';

// ============================================================================
// Known Keywords
// ============================================================================

/// Directive keywords the router understands
///
/// `Note` and `Scan` imply a conversation mode switch. The rest are
/// recognized but mode-neutral: they are surfaced to the prompt assembler
/// as a meta-instruction and routed to external handlers, never changing
/// the persisted mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownKeyword {
    /// Calendar request, routed to the calendar collaborator
    Calendar,
    /// Quick reminder, routed like a calendar request
    Reminder,
    /// Note taking; switches the conversation to note mode
    Note,
    /// Document scanning; switches the conversation to scan mode
    Scan,
    /// Help request about available directives
    Help,
}

impl KnownKeyword {
    /// Resolve a case-folded keyword, accepting aliases
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "calendar" | "agenda" | "cal" => Some(Self::Calendar),
            "reminder" | "herinnering" => Some(Self::Reminder),
            "note" | "notitie" => Some(Self::Note),
            "scan" => Some(Self::Scan),
            "help" | "hulp" => Some(Self::Help),
            _ => None,
        }
    }

    /// Canonical keyword name (aliases collapse to this)
    #[must_use]
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Reminder => "reminder",
            Self::Note => "note",
            Self::Scan => "scan",
            Self::Help => "help",
        }
    }

    /// The mode this keyword switches the conversation to, if any
    #[must_use]
    pub fn implied_mode(&self) -> Option<Mode> {
        match self {
            Self::Note => Some(Mode::Note),
            Self::Scan => Some(Mode::Scan),
            Self::Calendar | Self::Reminder | Self::Help => None,
        }
    }
}

// ============================================================================
// Directive
// ============================================================================

/// A parsed `#keyword argument` prefix
///
/// Transient value: directives influence mode selection and prompt assembly
/// but are never persisted as their own entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    /// The keyword, case-folded, without the leading marker
    pub keyword: String,
    /// The remainder of the message after the keyword, trimmed
    pub argument: String,
    /// The original raw text the directive was parsed from
    pub raw: String,
}

impl Directive {
    /// Resolve the keyword against the known table, if it matches
    #[must_use]
    pub fn known(&self) -> Option<KnownKeyword> {
        KnownKeyword::from_keyword(&self.keyword)
    }

    /// Canonical keyword if known, otherwise the keyword as parsed
    #[must_use]
    pub fn canonical_keyword(&self) -> &str {
        self.known().map_or(self.keyword.as_str(), |k| k.canonical())
    }
}

/// Parse raw message text for a leading directive
///
/// Returns `None` for plain chat content. Never fails.
#[must_use]
pub fn parse(text: &str) -> Option<Directive> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix(DIRECTIVE_MARKER)?;

    // Keyword grammar: [A-Za-z][A-Za-z0-9_]*
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() => {}
        _ => return None,
    }
    let keyword_end = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(rest.len(), |(i, _)| i);

    let keyword = rest[..keyword_end].to_ascii_lowercase();
    let argument = rest[keyword_end..].trim().to_string();

    Some(Directive {
        keyword,
        argument,
        raw: trimmed.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
