//! Static line topology.
//!
//! The adjacency description maps each machine name to its upstream and
//! downstream links. Resolution turns the names into arena keys once, at
//! construction, so the hot loop addresses components by key instead of by
//! string lookup.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use slotmap::SlotMap;

use crate::id::{ConveyorId, MachineId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while resolving an adjacency description. Fatal at reset.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("topology has no machines")]
    Empty,
    #[error("conveyor {name:?} has no {role} machine")]
    DanglingConveyor { name: String, role: &'static str },
    #[error("conveyor {name:?} has more than one {role} machine")]
    AmbiguousConveyor { name: String, role: &'static str },
    #[error("identifier {name:?} used as both a conveyor and a {role}")]
    SentinelCollision { name: String, role: &'static str },
}

// ---------------------------------------------------------------------------
// Adjacency description
// ---------------------------------------------------------------------------

/// One side of a machine's adjacency entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Link {
    /// An infinite supply feeding the first machine of a line.
    Source(String),
    /// An unbounded accumulator collecting finished product.
    Sink(String),
    /// An intermediate buffer between two machines.
    Conveyor(String),
}

impl Link {
    /// Classify a raw identifier the way scenario files spell them: names
    /// containing `source` or `sink` are sentinels, everything else is a
    /// conveyor.
    pub fn parse(name: &str) -> Self {
        if name.contains("source") {
            Self::Source(name.to_owned())
        } else if name.contains("sink") {
            Self::Sink(name.to_owned())
        } else {
            Self::Conveyor(name.to_owned())
        }
    }
}

/// Machine name to (upstream link, downstream link).
pub type Adjacency = BTreeMap<String, (Link, Link)>;

/// The canonical serial line: `m0 - c0 - m1 - ... - c(n-2) - m(n-1)`,
/// fed by `source1` and draining into `sink`.
pub fn serial(machine_count: usize) -> Adjacency {
    let mut adjacency = Adjacency::new();
    for i in 0..machine_count {
        let upstream = if i == 0 {
            Link::parse("source1")
        } else {
            Link::parse(&format!("c{}", i - 1))
        };
        let downstream = if i + 1 == machine_count {
            Link::parse("sink")
        } else {
            Link::parse(&format!("c{i}"))
        };
        adjacency.insert(format!("m{i}"), (upstream, downstream));
    }
    adjacency
}

// ---------------------------------------------------------------------------
// Resolved topology
// ---------------------------------------------------------------------------

/// A machine's resolved neighborhood. `None` on either side means the
/// machine borders a source or a sink rather than a conveyor.
#[derive(Debug, Clone)]
pub struct MachineLinks {
    pub name: String,
    pub upstream: Option<ConveyorId>,
    pub downstream: Option<ConveyorId>,
}

/// A conveyor's resolved endpoints. Exactly one machine feeds it and
/// exactly one machine drains it.
#[derive(Debug, Clone)]
pub struct ConveyorLinks {
    pub name: String,
    pub feeder: MachineId,
    pub drainer: MachineId,
}

/// Compare names with embedded numbers positionally: runs of digits compare
/// by numeric value, so `m2` orders before `m10`. Plain lexicographic
/// ordering would misalign such names with their line position.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
        let n = s
            .iter()
            .position(|c| !c.is_ascii_digit())
            .unwrap_or(s.len());
        s.split_at(n)
    }

    fn trim_zeros(run: &[u8]) -> &[u8] {
        &run[run.iter().position(|&c| c != b'0').unwrap_or(run.len())..]
    }

    let mut a = a.as_bytes();
    let mut b = b.as_bytes();
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&x), Some(&y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (run_a, rest_a) = split_digits(a);
                let (run_b, rest_b) = split_digits(b);
                let value_a = trim_zeros(run_a);
                let value_b = trim_zeros(run_b);
                // A longer trimmed run is a larger number; equal lengths
                // compare digit-wise; raw run length splits zero paddings.
                let ordering = value_a
                    .len()
                    .cmp(&value_b.len())
                    .then_with(|| value_a.cmp(value_b))
                    .then_with(|| run_a.len().cmp(&run_b.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(&x), Some(&y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

/// Resolved, immutable line topology.
///
/// Owns the key arenas; all per-component mutable state lives in
/// `SecondaryMap`s keyed on these ids.
#[derive(Debug)]
pub struct LineTopology {
    machines: SlotMap<MachineId, MachineLinks>,
    conveyors: SlotMap<ConveyorId, ConveyorLinks>,
    /// Machine keys in natural name order.
    machine_order: Vec<MachineId>,
    /// Conveyor keys in natural name order.
    conveyor_order: Vec<ConveyorId>,
    sources: BTreeSet<String>,
    sinks: BTreeSet<String>,
}

impl LineTopology {
    /// Resolve an adjacency description. Pure; called once per reset.
    pub fn resolve(adjacency: &Adjacency) -> Result<Self, TopologyError> {
        if adjacency.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut sources = BTreeSet::new();
        let mut sinks = BTreeSet::new();
        let mut conveyor_names = BTreeSet::new();
        for (upstream, downstream) in adjacency.values() {
            for link in [upstream, downstream] {
                match link {
                    Link::Source(name) => {
                        sources.insert(name.clone());
                    }
                    Link::Sink(name) => {
                        sinks.insert(name.clone());
                    }
                    Link::Conveyor(name) => {
                        conveyor_names.insert(name.clone());
                    }
                }
            }
        }
        for name in &conveyor_names {
            if sources.contains(name) {
                return Err(TopologyError::SentinelCollision {
                    name: name.clone(),
                    role: "source",
                });
            }
            if sinks.contains(name) {
                return Err(TopologyError::SentinelCollision {
                    name: name.clone(),
                    role: "sink",
                });
            }
        }

        // Key allocation order is arbitrary; line order comes from the
        // natural sort below.
        let mut machines: SlotMap<MachineId, MachineLinks> = SlotMap::with_key();
        let mut machine_keys = BTreeMap::new();
        for name in adjacency.keys() {
            let key = machines.insert(MachineLinks {
                name: name.clone(),
                upstream: None,
                downstream: None,
            });
            machine_keys.insert(name.clone(), key);
        }

        let mut conveyors: SlotMap<ConveyorId, ConveyorLinks> = SlotMap::with_key();
        let mut conveyor_keys = BTreeMap::new();
        for name in &conveyor_names {
            // Endpoint discovery: the feeder names this conveyor as its
            // downstream link, the drainer as its upstream link.
            let mut feeder = None;
            let mut drainer = None;
            for (machine, (upstream, downstream)) in adjacency {
                if matches!(upstream, Link::Conveyor(n) if n == name) {
                    if drainer.is_some() {
                        return Err(TopologyError::AmbiguousConveyor {
                            name: name.clone(),
                            role: "downstream",
                        });
                    }
                    drainer = Some(machine_keys[machine]);
                }
                if matches!(downstream, Link::Conveyor(n) if n == name) {
                    if feeder.is_some() {
                        return Err(TopologyError::AmbiguousConveyor {
                            name: name.clone(),
                            role: "upstream",
                        });
                    }
                    feeder = Some(machine_keys[machine]);
                }
            }
            let feeder = feeder.ok_or_else(|| TopologyError::DanglingConveyor {
                name: name.clone(),
                role: "upstream",
            })?;
            let drainer = drainer.ok_or_else(|| TopologyError::DanglingConveyor {
                name: name.clone(),
                role: "downstream",
            })?;
            let key = conveyors.insert(ConveyorLinks {
                name: name.clone(),
                feeder,
                drainer,
            });
            conveyor_keys.insert(name.clone(), key);
        }

        for (machine, (upstream, downstream)) in adjacency {
            let key = machine_keys[machine];
            if let Link::Conveyor(name) = upstream {
                machines[key].upstream = Some(conveyor_keys[name]);
            }
            if let Link::Conveyor(name) = downstream {
                machines[key].downstream = Some(conveyor_keys[name]);
            }
        }

        let mut sorted_machines: Vec<(String, MachineId)> = machine_keys.into_iter().collect();
        sorted_machines.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
        let machine_order = sorted_machines.into_iter().map(|(_, key)| key).collect();

        let mut sorted_conveyors: Vec<(String, ConveyorId)> = conveyor_keys.into_iter().collect();
        sorted_conveyors.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
        let conveyor_order = sorted_conveyors.into_iter().map(|(_, key)| key).collect();

        Ok(Self {
            machines,
            conveyors,
            machine_order,
            conveyor_order,
            sources,
            sinks,
        })
    }

    pub fn machine_count(&self) -> usize {
        self.machine_order.len()
    }

    pub fn conveyor_count(&self) -> usize {
        self.conveyor_order.len()
    }

    /// Machine keys in natural name order, which for canonical `m{i}`
    /// names is the physical line order.
    pub fn machines(&self) -> &[MachineId] {
        &self.machine_order
    }

    /// Conveyor keys in natural name order.
    pub fn conveyors(&self) -> &[ConveyorId] {
        &self.conveyor_order
    }

    pub fn machine_links(&self, id: MachineId) -> &MachineLinks {
        &self.machines[id]
    }

    pub fn conveyor_links(&self, id: ConveyorId) -> &ConveyorLinks {
        &self.conveyors[id]
    }

    /// Key of the machine at a given position in line order.
    pub fn machine_at(&self, index: usize) -> MachineId {
        self.machine_order[index]
    }

    /// Position of a machine in line order.
    pub fn machine_index(&self, id: MachineId) -> usize {
        self.machine_order
            .iter()
            .position(|&m| m == id)
            .unwrap_or(usize::MAX)
    }

    /// Machines whose downstream link is a sink, in line order.
    pub fn sink_machines(&self) -> impl Iterator<Item = MachineId> + '_ {
        self.machine_order
            .iter()
            .copied()
            .filter(|&id| self.machines[id].downstream.is_none())
    }

    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    pub fn sinks(&self) -> &BTreeSet<String> {
        &self.sinks
    }
}
