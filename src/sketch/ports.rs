//! Port selection over `arduino-cli board list` output.
//!
//! Each relevant listing line starts with a port token followed by columns
//! describing the device, e.g.
//!
//! ```text
//! Port         Protocol Type              Board Name  FQBN            Core
//! COM19        serial   Serial Port (USB) Arduino Uno arduino:avr:uno arduino:avr
//! /dev/ttyS0   serial   Serial Port       Unknown
//! ```
//!
//! Selection walks a ranked list of [`PortRule`]s; the first rule that
//! matches any line decides the port.

/// How a rule tests a listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    Contains(String),
    ContainsIgnoreCase(String),
}

impl LineMatch {
    fn matches(&self, line: &str) -> bool {
        match self {
            LineMatch::Contains(needle) => line.contains(needle.as_str()),
            LineMatch::ContainsIgnoreCase(needle) => {
                line.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

/// One ranked selection rule. Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRule {
    pub name: String,
    pub matcher: LineMatch,
    pub priority: u32,
}

impl PortRule {
    /// Prefer lines naming `board`, e.g. "Arduino Uno".
    pub fn board(board: impl Into<String>, priority: u32) -> Self {
        let board = board.into();
        Self {
            name: board.clone(),
            matcher: LineMatch::Contains(board),
            priority,
        }
    }

    /// Accept any serial device.
    pub fn any_serial() -> Self {
        Self {
            name: "serial".to_string(),
            matcher: LineMatch::ContainsIgnoreCase("serial".to_string()),
            priority: SERIAL_FALLBACK_PRIORITY,
        }
    }
}

const SERIAL_FALLBACK_PRIORITY: u32 = 100;

/// A port picked from the listing and the rule that picked it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSelection {
    pub port: String,
    pub rule: String,
}

#[derive(Debug, Clone)]
pub struct PortSelector {
    rules: Vec<PortRule>,
}

impl Default for PortSelector {
    fn default() -> Self {
        Self::with_preferred_boards(["Arduino Uno"])
    }
}

impl PortSelector {
    /// Build from explicit rules. Rules are stably sorted by priority.
    pub fn new(mut rules: Vec<PortRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    /// Preferred boards in order, then any serial port.
    pub fn with_preferred_boards<I, S>(boards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules: Vec<PortRule> = boards
            .into_iter()
            .map(Into::<String>::into)
            .filter(|b| !b.trim().is_empty())
            .enumerate()
            .map(|(i, b)| PortRule::board(b, i as u32))
            .collect();
        // The serial fallback must rank after every preferred board.
        let mut serial = PortRule::any_serial();
        serial.priority = serial.priority.max(rules.len() as u32);
        rules.push(serial);
        Self::new(rules)
    }

    pub fn rules(&self) -> &[PortRule] {
        &self.rules
    }

    /// Pick a port from `listing`, or `None` if no rule matches.
    pub fn select(&self, listing: &str) -> Option<PortSelection> {
        self.rules.iter().find_map(|rule| {
            listing
                .lines()
                .filter(|line| rule.matcher.matches(line))
                .find_map(leading_token)
                .map(|port| PortSelection {
                    port: port.to_string(),
                    rule: rule.name.clone(),
                })
        })
    }
}

/// The token at the very start of `line`; none if the line is blank or
/// indented.
fn leading_token(line: &str) -> Option<&str> {
    line.split(char::is_whitespace)
        .next()
        .filter(|token| !token.is_empty())
}
