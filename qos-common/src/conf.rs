//! The external configuration record.
//!
//! These are the types the outer router hands over after loading and
//! validating its configuration file; reading the file itself happens
//! outside this workspace. Rules arrive in their string form and are
//! converted to the internal representation by the classifier crate.

use serde::Deserialize;

/// Verdict of the admission and policing layers for one packet.
///
/// Datapath outcomes are always encoded in this type, never as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoliceAction {
    /// Admit the packet.
    #[default]
    Pass,
    /// Drop the packet silently.
    Drop,
    /// Drop the packet and notify the sender.
    DropNotify,
    /// Admit the packet but mark it as having exceeded its class profile.
    Mark,
}

/// A traffic class rule as written in the router configuration.
///
/// `source_match_mode` / `destination_match_mode` carry the integer codes
/// `0=Exact, 1=IsdOnly, 2=AsOnly, 3=Range, 4=Any, 5=Intf`. Range strings
/// separate the two bounds with a literal `"||"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalClassRule {
    pub name: String,
    pub priority: i32,
    pub source_as: String,
    pub source_match_mode: u8,
    pub destination_as: String,
    pub destination_match_mode: u8,
    /// Disjunction of layer-4 matches; a rule with an empty list never
    /// matches any packet.
    #[serde(default)]
    pub l4_type: Vec<ExternalProtocolMatch>,
    pub queue_number: u16,
}

/// One layer-4 protocol plus extension discriminator.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProtocolMatch {
    pub base_protocol: u8,
    /// Extension type, `-1` meaning any extension.
    #[serde(default = "any_extension")]
    pub extension: i16,
}

fn any_extension() -> i16 {
    -1
}

/// One entry of a queue's fill-level admission profile.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    /// Fill level in percent at which this entry starts to apply.
    pub fill_level: u8,
    /// Probability in percent that the action fires once the level is
    /// reached.
    pub prob: u8,
    pub action: PoliceAction,
}

/// Parameters of the congestion warning emitted for a queue. Consumed by
/// the notification layer outside this workspace; carried through verbatim.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CongestionWarning {
    pub approach: u8,
    pub information_content: u8,
}

/// Static description of one per-class packet queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDescriptor {
    pub id: u16,
    pub name: String,
    /// Capacity in packets.
    pub max_length: usize,
    /// Token bucket refill rate in bytes per second.
    pub police_rate: u64,
    /// Verdict when the token bucket cannot cover a packet.
    #[serde(default = "default_over_rate_action")]
    pub over_rate_action: PoliceAction,
    /// Committed information rate, consumed by the scheduler.
    #[serde(default)]
    pub min_bandwidth: u64,
    /// Peak information rate, consumed by the scheduler.
    #[serde(default)]
    pub max_bandwidth: u64,
    /// Scheduling priority of this queue relative to its siblings.
    #[serde(default)]
    pub priority: u8,
    /// Admission profile, sorted ascending by fill level.
    #[serde(default)]
    pub profile: Vec<ProfileEntry>,
    #[serde(default)]
    pub congestion_warning: CongestionWarning,
}

fn default_over_rate_action() -> PoliceAction {
    PoliceAction::Drop
}

/// The complete, already-validated configuration record for one epoch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QosConfig {
    #[serde(default)]
    pub rules: Vec<ExternalClassRule>,
    pub queues: Vec<QueueDescriptor>,
}
