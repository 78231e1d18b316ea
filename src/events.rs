//! Simulation event dispatch
//!
//! The core publishes fire-and-forget notifications to any number of sinks.
//! Breaks go out immediately; stress and destroy notifications are
//! aggregated per (material, underwater) and drained once per tick by
//! [`SimulationEventDispatcher::flush`]. Publishing with no sinks is a no-op.

use std::sync::{Arc, Mutex, PoisonError};

use bevy::prelude::*;
use indexmap::IndexMap;

use crate::core::MaterialId;
use crate::npcs::NpcId;

#[derive(Clone, Debug, PartialEq)]
pub enum SimulationEvent {
    Break {
        material: MaterialId,
        is_underwater: bool,
        count: u32,
    },
    Destroy {
        material: MaterialId,
        is_underwater: bool,
        count: u32,
    },
    Stress {
        material: MaterialId,
        is_underwater: bool,
        count: u32,
    },
    NpcCountsUpdated {
        npc_count: usize,
        max_npcs: usize,
    },
    HumanNpcCountsUpdated {
        constrained: usize,
        free: usize,
    },
    NpcSelectionChanged {
        selected: Option<NpcId>,
    },
    HumanNpcBehaviorChanged {
        npc: NpcId,
        behavior: &'static str,
    },
}

pub trait SimulationEventSink: Send + Sync {
    fn on_event(&mut self, event: &SimulationEvent);
}

type AggregationKey = (MaterialId, bool);

#[derive(Default)]
pub struct SimulationEventDispatcher {
    sinks: Vec<Box<dyn SimulationEventSink>>,
    stress: IndexMap<AggregationKey, u32>,
    destroy: IndexMap<AggregationKey, u32>,
}

impl SimulationEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sink(&mut self, sink: Box<dyn SimulationEventSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn publish(&mut self, event: SimulationEvent) {
        for sink in &mut self.sinks {
            sink.on_event(&event);
        }
    }

    pub fn on_break(&mut self, material: MaterialId, is_underwater: bool, count: u32) {
        self.publish(SimulationEvent::Break {
            material,
            is_underwater,
            count,
        });
    }

    pub fn on_stress(&mut self, material: MaterialId, is_underwater: bool, count: u32) {
        *self.stress.entry((material, is_underwater)).or_insert(0) += count;
    }

    pub fn on_destroy(&mut self, material: MaterialId, is_underwater: bool, count: u32) {
        *self.destroy.entry((material, is_underwater)).or_insert(0) += count;
    }

    pub fn on_npc_counts_updated(&mut self, npc_count: usize, max_npcs: usize) {
        self.publish(SimulationEvent::NpcCountsUpdated {
            npc_count,
            max_npcs,
        });
    }

    pub fn on_human_npc_counts_updated(&mut self, constrained: usize, free: usize) {
        self.publish(SimulationEvent::HumanNpcCountsUpdated { constrained, free });
    }

    /// Drains the aggregated notifications, in first-seen order.
    pub fn flush(&mut self) {
        let stress: Vec<_> = self.stress.drain(..).collect();
        for ((material, is_underwater), count) in stress {
            self.publish(SimulationEvent::Stress {
                material,
                is_underwater,
                count,
            });
        }

        let destroy: Vec<_> = self.destroy.drain(..).collect();
        for ((material, is_underwater), count) in destroy {
            self.publish(SimulationEvent::Destroy {
                material,
                is_underwater,
                count,
            });
        }
    }
}

/// Sink that keeps every event; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SimulationEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimulationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn count_matching(&self, predicate: impl Fn(&SimulationEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl SimulationEventSink for RecordingSink {
    fn on_event(&mut self, event: &SimulationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Sink that forwards every event to the log.
pub struct LogSink;

impl SimulationEventSink for LogSink {
    fn on_event(&mut self, event: &SimulationEvent) {
        match event {
            SimulationEvent::Break { .. } | SimulationEvent::Destroy { .. } => debug!("{event:?}"),
            SimulationEvent::Stress { .. } | SimulationEvent::HumanNpcBehaviorChanged { .. } => {
                trace!("{event:?}")
            }
            _ => info!("{event:?}"),
        }
    }
}
