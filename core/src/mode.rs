//! Conversation Modes
//!
//! The mode registry and selector. A mode is a named behavior profile with
//! its own system-prompt template; a conversation has exactly one mode at a
//! time and every turn is interpreted under that mode's prompt.
//!
//! # Design Philosophy
//!
//! The mode-to-prompt mapping is an explicit immutable structure built once
//! at startup and passed into the selector and the prompt assembler, not
//! mutable global state. Templates are parameterized by locale; the output
//! for a given (mode, locale) pair is deterministic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::directive::Directive;

// ============================================================================
// Mode
// ============================================================================

/// A conversation behavior profile
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// General-purpose text chat
    #[default]
    Chat,
    /// Responses optimized for speech output
    Voice,
    /// Note structuring and capture
    Note,
    /// Document analysis and extraction
    Scan,
}

impl Mode {
    /// All modes, in declaration order
    pub const ALL: [Mode; 4] = [Mode::Chat, Mode::Voice, Mode::Note, Mode::Scan];

    /// Stable lowercase name of the mode
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Voice => "voice",
            Self::Note => "note",
            Self::Scan => "scan",
        }
    }

    /// Parse a mode from its lowercase name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chat" => Some(Self::Chat),
            "voice" => Some(Self::Voice),
            "note" => Some(Self::Note),
            "scan" => Some(Self::Scan),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// English system-prompt templates
const EN_PROMPTS: [(Mode, &str); 4] = [
    (
        Mode::Chat,
        "You are a personal assistant. You help with calendar management, \
         note taking, document scanning, and general questions.\n\
         Be friendly, helpful, and to the point. Ask a clarifying question \
         when a request is ambiguous.\n\
         Users can prefix a message with a directive: #calendar for \
         appointments, #note for notes, #scan for documents.",
    ),
    (
        Mode::Voice,
        "You are a personal assistant answering by voice. Use short, clear \
         sentences and natural language. No bullet lists. Ask for \
         confirmation before important actions.",
    ),
    (
        Mode::Note,
        "You are a personal assistant in note mode. Help the user structure \
         and organize notes, summarize key points, suggest tags, and \
         identify action items.",
    ),
    (
        Mode::Scan,
        "You are a personal assistant in scan mode. Help the user analyze \
         documents: extract and structure text, identify the important \
         information, and summarize scanned content.",
    ),
];

/// Dutch system-prompt templates
const NL_PROMPTS: [(Mode, &str); 4] = [
    (
        Mode::Chat,
        "Je bent een persoonlijke assistent. Je helpt met agendabeheer, \
         notities, documenten scannen en algemene vragen.\n\
         Wees vriendelijk, behulpzaam en to-the-point. Stel een \
         verduidelijkende vraag als iets onduidelijk is.\n\
         Gebruikers kunnen een bericht beginnen met een directive: \
         #calendar voor afspraken, #note voor notities, #scan voor \
         documenten.",
    ),
    (
        Mode::Voice,
        "Je bent een persoonlijke spraakassistent. Gebruik korte, duidelijke \
         zinnen en natuurlijke taal. Geen opsommingen. Vraag om bevestiging \
         bij belangrijke acties.",
    ),
    (
        Mode::Note,
        "Je bent een persoonlijke assistent in notitie-modus. Help notities \
         structureren en organiseren, vat kernpunten samen, stel tags voor \
         en benoem actiepunten.",
    ),
    (
        Mode::Scan,
        "Je bent een persoonlijke assistent in scan-modus. Help documenten \
         analyseren: tekst extraheren en structureren, belangrijke \
         informatie herkennen en gescande inhoud samenvatten.",
    ),
];

/// Immutable mapping from mode to system-prompt template
///
/// Built once at startup; the prompt for a given (mode, locale) pair never
/// changes afterwards. Unknown locales fall back to English.
#[derive(Clone, Debug)]
pub struct ModeRegistry {
    locale: String,
    prompts: HashMap<Mode, String>,
}

impl ModeRegistry {
    /// Build the registry for the given locale code (`"en"`, `"nl"`)
    #[must_use]
    pub fn with_locale(locale: &str) -> Self {
        let table = match locale {
            "nl" => &NL_PROMPTS,
            _ => &EN_PROMPTS,
        };
        let resolved = if locale == "nl" { "nl" } else { "en" };

        Self {
            locale: resolved.to_string(),
            prompts: table
                .iter()
                .map(|(mode, prompt)| (*mode, (*prompt).to_string()))
                .collect(),
        }
    }

    /// The locale the registry was built for
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The system-prompt template for a mode
    #[must_use]
    pub fn system_prompt(&self, mode: Mode) -> &str {
        // Every mode is present by construction
        self.prompts
            .get(&mode)
            .map_or("", |prompt| prompt.as_str())
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::with_locale("en")
    }
}

// ============================================================================
// Selector
// ============================================================================

/// What the selector decided beyond the effective mode
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionAction {
    /// No directive, or the directive matched the current mode
    None,
    /// The directive implies a different mode; persist the switch
    PersistSwitch(Mode),
    /// Mode-neutral or unrecognized directive; surface it to the prompt
    /// assembler as a meta-instruction, leave the persisted mode alone
    MetaInstruction(Directive),
}

/// The outcome of mode selection for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The mode this turn runs under
    pub effective: Mode,
    /// Whether the selection changes persisted state or carries a meta
    pub action: SelectionAction,
}

/// Decide the effective mode for a turn
///
/// `current` is the conversation's mode, or `None` for a brand-new
/// conversation (which defaults to [`Mode::Chat`]). A mode switch and an
/// unrecognized keyword are distinguished outcomes: only the former touches
/// persisted state.
#[must_use]
pub fn select(current: Option<Mode>, directive: Option<&Directive>) -> Selection {
    let current_mode = current.unwrap_or_default();

    let Some(directive) = directive else {
        return Selection {
            effective: current_mode,
            action: SelectionAction::None,
        };
    };

    if let Some(implied) = directive.known().and_then(|k| k.implied_mode()) {
        let action = if current == Some(implied) {
            SelectionAction::None
        } else {
            SelectionAction::PersistSwitch(implied)
        };
        return Selection {
            effective: implied,
            action,
        };
    }

    Selection {
        effective: current_mode,
        action: SelectionAction::MetaInstruction(directive.clone()),
    }
}

// ============================================================================
// Tests
// ============================================================================
