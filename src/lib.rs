//! Dataplane SNMP agent - an AgentX (RFC 2741) sub-agent.
//!
//! Connects to a master SNMP agent, registers the IF-MIB `ifTable` and
//! `ifXTable` subtrees and answers Get/GetNext/GetBulk requests from a
//! periodically refreshed snapshot of the dataplane's interfaces.
//!
//! # Usage
//!
//! ```bash
//! # Default master socket, poll every 30 seconds
//! dataplane-snmp-agent
//!
//! # TCP master, interface descriptions from YAML, PDU dumps
//! dataplane-snmp-agent -a localhost:705 -c /etc/ifmib.yaml -d --debug-agent
//! ```

/// Polling shell around an AgentX session.
pub mod agent;
/// AgentX protocol: OIDs, PDU codec, datasets and the sub-agent session.
pub mod agentx;
/// Command-line configuration and validation.
pub mod configuration;
/// Interface inventory backends.
pub mod dataplane;
/// IF-MIB tables built from dataplane interfaces.
pub mod ifmib;
/// YAML interface descriptions.
pub mod metadata;
