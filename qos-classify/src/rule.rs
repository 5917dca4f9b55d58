use std::sync::Arc;

use qos_common::{
    addr::AddrParseError,
    conf::ExternalClassRule,
    packet::ExtHeader,
    IsdAs,
};
use thiserror::Error;

/// Extension value meaning "any extension matches".
pub const ANY_EXTENSION: i16 = -1;

/// Errors raised while converting external rules into their internal form.
///
/// Every variant is fatal: a configuration that fails conversion is rejected
/// as a whole, nothing is guessed.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule:?}: unknown match mode {mode}")]
    InvalidMatchMode { rule: String, mode: u8 },
    #[error("rule {rule:?}: invalid range {value:?}, expected \"<low>||<high>\"")]
    InvalidRange { rule: String, value: String },
    #[error("rule {rule:?}: invalid interface id {value:?}")]
    InvalidInterface { rule: String, value: String },
    #[error("rule {rule:?}: interface matching is not supported on the destination side")]
    InterfaceDestination { rule: String },
    #[error("rule {rule:?}: {source}")]
    Addr { rule: String, source: AddrParseError },
}

/// How one side of a rule is matched against a packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The full `(ISD, AS)` pair must be equal.
    Exact,
    /// Only the ISD part is consulted.
    IsdOnly,
    /// Only the AS part is consulted.
    AsOnly,
    /// Both components must lie within an inclusive rectangle.
    Range,
    /// Matches every identifier.
    Any,
    /// Matches the packet's ingress interface instead of an identifier.
    /// Only valid on the source side.
    Intf,
}

impl MatchMode {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Exact),
            1 => Some(Self::IsdOnly),
            2 => Some(Self::AsOnly),
            3 => Some(Self::Range),
            4 => Some(Self::Any),
            5 => Some(Self::Intf),
            _ => None,
        }
    }
}

/// One side (source or destination) of a class rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub mode: MatchMode,
    /// Identifier consulted for `Exact`, and partially for `IsdOnly` /
    /// `AsOnly`.
    pub ia: IsdAs,
    /// Inclusive lower bound, set for `Range`.
    pub low: IsdAs,
    /// Inclusive upper bound, set for `Range`.
    pub high: IsdAs,
    /// Ingress interface id, set for `Intf`.
    pub intf: u64,
}

impl RuleMatch {
    pub fn exact(ia: IsdAs) -> Self {
        Self { mode: MatchMode::Exact, ia, ..Self::any() }
    }

    pub fn isd_only(ia: IsdAs) -> Self {
        Self { mode: MatchMode::IsdOnly, ia, ..Self::any() }
    }

    pub fn as_only(ia: IsdAs) -> Self {
        Self { mode: MatchMode::AsOnly, ia, ..Self::any() }
    }

    pub fn range(low: IsdAs, high: IsdAs) -> Self {
        Self { mode: MatchMode::Range, low, high, ..Self::any() }
    }

    pub fn interface(intf: u64) -> Self {
        Self { mode: MatchMode::Intf, intf, ..Self::any() }
    }

    pub fn any() -> Self {
        Self {
            mode: MatchMode::Any,
            ia: IsdAs::default(),
            low: IsdAs::default(),
            high: IsdAs::default(),
            intf: 0,
        }
    }
}

/// One layer-4 protocol plus extension discriminator of a rule's l4
/// disjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolMatch {
    pub base_protocol: u8,
    /// Extension type, [`ANY_EXTENSION`] meaning any.
    pub extension: i16,
}

impl ProtocolMatch {
    fn accepts_extensions(&self, extensions: &[ExtHeader]) -> bool {
        self.extension == ANY_EXTENSION
            || extensions
                .iter()
                .any(|e| e.class == self.base_protocol && i16::from(e.ext_type) == self.extension)
    }
}

/// Internal form of a traffic class rule.
///
/// Rules are immutable once installed; the index and the cache share them
/// through `Arc`, and rule identity is the `Arc` pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRule {
    /// Human-readable name, not used for matching.
    pub name: String,
    pub priority: i32,
    pub source: RuleMatch,
    pub destination: RuleMatch,
    /// Disjunction of protocol matches; empty never matches.
    pub l4: Vec<ProtocolMatch>,
    pub queue_number: u16,
}

impl ClassRule {
    /// The distinguished rule returned when no user rule matches a packet.
    pub fn default_rule() -> Arc<Self> {
        Arc::new(Self {
            name: "default".to_string(),
            priority: 0,
            source: RuleMatch::any(),
            destination: RuleMatch::any(),
            l4: Vec::new(),
            queue_number: 0,
        })
    }

    /// Converts one external rule, enforcing the integer match-mode codes,
    /// the `"||"` range separator and base-0 interface ids.
    pub fn from_external(external: &ExternalClassRule) -> Result<Self, RuleError> {
        let source = parse_match(
            &external.name,
            external.source_match_mode,
            &external.source_as,
            Side::Source,
        )?;
        let destination = parse_match(
            &external.name,
            external.destination_match_mode,
            &external.destination_as,
            Side::Destination,
        )?;
        let l4 = external
            .l4_type
            .iter()
            .map(|pm| ProtocolMatch { base_protocol: pm.base_protocol, extension: pm.extension })
            .collect();

        Ok(Self {
            name: external.name.clone(),
            priority: external.priority,
            source,
            destination,
            l4,
            queue_number: external.queue_number,
        })
    }

    /// Whether at least one protocol match accepts the packet's layer-4
    /// protocol and extension set.
    pub fn matches_l4(&self, l4: u8, extensions: &[ExtHeader]) -> bool {
        self.l4.iter().any(|pm| pm.base_protocol == l4 && pm.accepts_extensions(extensions))
    }

    /// Extension-only half of the match, used to re-validate cache hits
    /// (the cache key carries the l4 protocol but not the extensions).
    pub fn matches_extensions(&self, extensions: &[ExtHeader]) -> bool {
        self.l4.iter().any(|pm| pm.accepts_extensions(extensions))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Destination,
}

fn parse_match(rule: &str, code: u8, raw: &str, side: Side) -> Result<RuleMatch, RuleError> {
    let addr_err = |source| RuleError::Addr { rule: rule.to_string(), source };

    let mode = MatchMode::from_code(code)
        .ok_or_else(|| RuleError::InvalidMatchMode { rule: rule.to_string(), mode: code })?;

    match mode {
        MatchMode::Exact | MatchMode::IsdOnly | MatchMode::AsOnly | MatchMode::Any => {
            let ia: IsdAs = raw.parse().map_err(addr_err)?;
            Ok(RuleMatch { mode, ia, ..RuleMatch::any() })
        }
        MatchMode::Range => {
            let (low, high) = raw.split_once("||").ok_or_else(|| RuleError::InvalidRange {
                rule: rule.to_string(),
                value: raw.to_string(),
            })?;
            let low: IsdAs = low.parse().map_err(addr_err)?;
            let high: IsdAs = high.parse().map_err(addr_err)?;
            Ok(RuleMatch::range(low, high))
        }
        MatchMode::Intf => {
            if side == Side::Destination {
                return Err(RuleError::InterfaceDestination { rule: rule.to_string() });
            }
            let intf = parse_interface(raw).ok_or_else(|| RuleError::InvalidInterface {
                rule: rule.to_string(),
                value: raw.to_string(),
            })?;
            Ok(RuleMatch::interface(intf))
        }
    }
}

/// Parses an interface id with base-0 radix detection: `0x` hex, `0o`
/// octal, `0b` binary, a bare leading `0` also octal, decimal otherwise.
/// Interface ids are unsigned; negative input is rejected.
fn parse_interface(raw: &str) -> Option<u64> {
    let digits = raw.trim();
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        u64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = digits.strip_prefix('0').filter(|rest| !rest.is_empty()) {
        u64::from_str_radix(oct, 8).ok()
    } else {
        digits.parse::<u64>().ok()
    }
}
