//! Ephemeral particle pool
//!
//! A fixed number of slots for short-lived particles (air bubbles, debris,
//! smoke, sparkles, wake bubbles). Slots are handed out from a free list and
//! addressed through generation-tagged handles, so a handle to an evicted
//! particle can never alias its replacement.

use crate::math::{Real, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EphemeralType {
    AirBubble,
    Debris,
    Smoke,
    Sparkle,
    WakeBubble,
}

impl EphemeralType {
    /// Higher priority particles may evict lower or equal priority ones.
    pub fn priority(self) -> u8 {
        match self {
            Self::Sparkle => 0,
            Self::WakeBubble => 1,
            Self::AirBubble => 2,
            Self::Smoke => 3,
            Self::Debris => 4,
        }
    }
}

/// Per-kind payload of a live ephemeral particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EphemeralState {
    AirBubble {
        vortex_amplitude: Real,
        vortex_period: Real,
    },
    Debris,
    Smoke {
        growth_rate: Real,
        progress: Real,
    },
    Sparkle {
        progress: Real,
    },
    WakeBubble {
        progress: Real,
    },
}

impl EphemeralState {
    pub fn kind(&self) -> EphemeralType {
        match self {
            Self::AirBubble { .. } => EphemeralType::AirBubble,
            Self::Debris => EphemeralType::Debris,
            Self::Smoke { .. } => EphemeralType::Smoke,
            Self::Sparkle { .. } => EphemeralType::Sparkle,
            Self::WakeBubble { .. } => EphemeralType::WakeBubble,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EphemeralParticle {
    pub state: EphemeralState,
    pub start_time: Real,
    pub max_lifetime: Real,
}

impl EphemeralParticle {
    pub fn kind(&self) -> EphemeralType {
        self.state.kind()
    }

    pub fn age(&self, now: Real) -> Real {
        now - self.start_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EphemeralHandle {
    pub slot: u32,
    pub generation: u32,
}

#[derive(Clone, Debug, Default)]
struct EphemeralSlot {
    generation: u32,
    particle: Option<EphemeralParticle>,
}

#[derive(Clone, Debug)]
pub struct EphemeralPool {
    slots: Vec<EphemeralSlot>,
    free: Vec<u32>,
}

/// Outcome of a slot request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EphemeralAllocation {
    /// A free slot was taken.
    Fresh(EphemeralHandle),
    /// A live particle was evicted to make room.
    Evicted(EphemeralHandle),
}

impl EphemeralAllocation {
    pub fn handle(self) -> EphemeralHandle {
        match self {
            Self::Fresh(handle) | Self::Evicted(handle) => handle,
        }
    }
}

impl EphemeralPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![EphemeralSlot::default(); capacity],
            // Popped from the back, so the lowest slot goes first
            free: (0..capacity as u32).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Reserves a slot for a particle of `kind`.
    ///
    /// Free slots are always used first. When none is left the oldest live
    /// particle whose priority does not exceed `kind`'s is evicted. Returns
    /// `None` when every live particle outranks the request.
    pub fn allocate(&mut self, particle: EphemeralParticle) -> Option<EphemeralAllocation> {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.particle = Some(particle);
            return Some(EphemeralAllocation::Fresh(EphemeralHandle {
                slot,
                generation: entry.generation,
            }));
        }

        let priority = particle.kind().priority();
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.particle.map(|p| (slot, p)))
            .filter(|(_, p)| p.kind().priority() <= priority)
            .min_by(|(_, a), (_, b)| a.start_time.total_cmp(&b.start_time))
            .map(|(slot, _)| slot)?;

        let entry = &mut self.slots[victim];
        entry.generation = entry.generation.wrapping_add(1);
        entry.particle = Some(particle);
        Some(EphemeralAllocation::Evicted(EphemeralHandle {
            slot: victim as u32,
            generation: entry.generation,
        }))
    }

    /// Returns the slot to the free list; stale handles are ignored.
    pub fn release(&mut self, handle: EphemeralHandle) -> bool {
        match self.slots.get_mut(handle.slot as usize) {
            Some(entry) if entry.generation == handle.generation && entry.particle.is_some() => {
                entry.particle = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(handle.slot);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, handle: EphemeralHandle) -> Option<&EphemeralParticle> {
        self.slots
            .get(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.particle.as_ref())
    }

    pub fn get_mut(&mut self, handle: EphemeralHandle) -> Option<&mut EphemeralParticle> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.particle.as_mut())
    }

    /// Handles of all live particles, in slot order.
    pub fn live_handles(&self) -> Vec<EphemeralHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.particle.is_some())
            .map(|(slot, entry)| EphemeralHandle {
                slot: slot as u32,
                generation: entry.generation,
            })
            .collect()
    }
}

/// Initial velocity kick for a freshly spawned particle.
pub fn initial_velocity(kind: EphemeralType, base: Vector) -> Vector {
    match kind {
        EphemeralType::AirBubble | EphemeralType::WakeBubble => Vector::new(0.0, 0.5),
        EphemeralType::Smoke => Vector::new(0.0, 0.2),
        EphemeralType::Debris | EphemeralType::Sparkle => base,
    }
}
