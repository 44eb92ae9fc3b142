//! Registered agents, kept in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::ids::AgentId;
use crate::lens::Lens;
use crate::profile::AgentProfile;

/// An agent together with the routing inputs the kernel keeps for it.
pub(crate) struct AgentSlot {
    pub id: AgentId,
    pub agent: Box<dyn Agent>,
    pub profile: AgentProfile,
    pub lens: Arc<dyn Lens>,
}

/// Agents in registration order with an id index.
///
/// Registration order is the commit order, which decides same-key
/// environment collisions.
#[derive(Default)]
pub(crate) struct AgentTable {
    slots: Vec<AgentSlot>,
    index: HashMap<AgentId, usize>,
}

impl AgentTable {
    pub fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the slot back if the id is taken.
    pub fn insert(&mut self, slot: AgentSlot) -> Result<(), AgentSlot> {
        if self.contains(&slot.id) {
            return Err(slot);
        }
        self.index.insert(slot.id.clone(), self.slots.len());
        self.slots.push(slot);
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentSlot> {
        self.index.get(id).map(|&i| &self.slots[i])
    }

    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut AgentSlot> {
        let i = *self.index.get(id)?;
        self.slots.get_mut(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AgentSlot> {
        self.slots.iter_mut()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.slots.iter().map(|s| &s.profile)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
