//! Display metadata for message sources.
//!
//! Sources are open-ended strings. A fixed table covers the well-known ones;
//! anything else falls back to the raw source as its label, a generic icon,
//! and an accent picked from a palette by hashing the source string, so the
//! same unknown source always renders the same way.

use std::fmt;

/// Accent colour for a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accent {
    /// Blue.
    Blue,
    /// Green.
    Green,
    /// Red.
    Red,
    /// Purple.
    Purple,
    /// Yellow.
    Yellow,
    /// Cyan.
    Cyan,
    /// Orange.
    Orange,
    /// Pink.
    Pink,
    /// Teal.
    Teal,
    /// Gray.
    Gray,
}

impl Accent {
    /// Colour name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
            Self::Purple => "purple",
            Self::Yellow => "yellow",
            Self::Cyan => "cyan",
            Self::Orange => "orange",
            Self::Pink => "pink",
            Self::Teal => "teal",
            Self::Gray => "gray",
        }
    }
}

/// Palette for sources outside the table.
const FALLBACK_PALETTE: [Accent; 5] = [
    Accent::Cyan,
    Accent::Orange,
    Accent::Pink,
    Accent::Teal,
    Accent::Gray,
];

/// Icon for sources outside the table.
pub const FALLBACK_ICON: &str = "💬";

/// A source with fixed display metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KnownSource {
    /// The local human user.
    User,
    /// An API integration.
    Api,
    /// An administrator.
    Admin,
    /// A livestream room relay.
    Livestream,
    /// The fleet agent.
    Fleet,
    /// The assistant / agent itself.
    Agent,
    /// System notices.
    System,
}

impl KnownSource {
    /// Case-insensitive table lookup.
    pub fn lookup(source: &str) -> Option<Self> {
        let known = match source.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "api" => Self::Api,
            "admin" => Self::Admin,
            "livestream" => Self::Livestream,
            "fleet" => Self::Fleet,
            "agent" | "assistant" => Self::Agent,
            "system" => Self::System,
            _ => return None,
        };
        Some(known)
    }

    fn display(self) -> (&'static str, &'static str, Accent) {
        match self {
            Self::User => ("User", "👤", Accent::Blue),
            Self::Api => ("API", "🤖", Accent::Green),
            Self::Admin => ("Admin", "👨‍💼", Accent::Red),
            Self::Livestream => ("Livestream", "📺", Accent::Purple),
            Self::Fleet => ("Fleet", "🚢", Accent::Yellow),
            Self::Agent => ("Agent", "🧠", Accent::Cyan),
            Self::System => ("System", "⚙️", Accent::Gray),
        }
    }
}

/// A message source, classified.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceRole {
    /// Listed in the display table.
    Known(KnownSource),
    /// Anything else, kept verbatim.
    Other(String),
}

impl SourceRole {
    /// Classify a raw source string.
    pub fn classify(source: &str) -> Self {
        KnownSource::lookup(source).map_or_else(|| Self::Other(source.trim().to_owned()), Self::Known)
    }

    /// Display metadata for this source.
    pub fn display(&self) -> RoleDisplay {
        match self {
            Self::Known(known) => {
                let (label, icon, accent) = known.display();
                RoleDisplay {
                    label: label.to_owned(),
                    icon,
                    accent,
                }
            }
            Self::Other(raw) => RoleDisplay {
                label: if raw.is_empty() {
                    "Unknown".to_owned()
                } else {
                    raw.clone()
                },
                icon: FALLBACK_ICON,
                accent: fallback_accent(raw),
            },
        }
    }
}

/// How to present a message's author.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleDisplay {
    /// Human-readable label.
    pub label: String,
    /// Single-glyph icon.
    pub icon: &'static str,
    /// Accent colour.
    pub accent: Accent,
}

impl fmt::Display for RoleDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon, self.label)
    }
}

/// Display metadata for a raw source string.
pub fn display_for(source: &str) -> RoleDisplay {
    SourceRole::classify(source).display()
}

#[allow(clippy::cast_possible_truncation)]
fn fallback_accent(source: &str) -> Accent {
    let index = (fnv1a(source.as_bytes()) % FALLBACK_PALETTE.len() as u64) as usize;
    FALLBACK_PALETTE[index]
}

/// 64-bit FNV-1a; stable across runs and platforms, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
