//! Persistence context registry.

use crate::defaults;
use crate::error::FixtureResult;
use fixturedb_provider::{PersistenceFactory, PersistenceProvider, Properties};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle type produced by a provider's factories.
pub type HandleOf<P> =
    <<P as PersistenceProvider>::Factory as PersistenceFactory>::Handle;

type Slot<F> = Arc<Mutex<Option<Arc<F>>>>;

/// Memoises one factory per persistence unit.
///
/// The map lock is only held to find or insert a unit's slot. Construction
/// runs under the slot's own lock, so concurrent first requests for one unit
/// build a single factory while different units build independently.
///
/// Share a registry through an `Arc` to reuse factories across fixtures.
pub struct Registry<P: PersistenceProvider> {
    provider: P,
    overrides: Properties,
    slots: Mutex<HashMap<String, Slot<P::Factory>>>,
}

impl<P: PersistenceProvider> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("overrides", &self.overrides)
            .field("units", &self.cached_units())
            .finish()
    }
}

impl<P: PersistenceProvider> Registry<P> {
    /// Creates an empty registry. `overrides` are layered over the built-in
    /// defaults for every factory.
    pub fn new(provider: P, overrides: Properties) -> Self {
        Self {
            provider,
            overrides,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Override properties applied to every factory.
    pub fn overrides(&self) -> &Properties {
        &self.overrides
    }

    /// Returns the factory for `unit`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the provider's construction error. Nothing is cached on
    /// failure, so a later call tries again.
    pub fn factory(&self, unit: &str) -> FixtureResult<Arc<P::Factory>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(unit.to_string()).or_default())
        };

        let mut cached = slot.lock();
        if let Some(factory) = cached.as_ref() {
            return Ok(Arc::clone(factory));
        }

        let properties = defaults::factory_properties(unit).merged(&self.overrides);
        debug!(unit, "constructing persistence factory");
        let factory = Arc::new(self.provider.create_factory(unit, &properties)?);
        info!(unit, "persistence factory cached");
        *cached = Some(Arc::clone(&factory));
        Ok(factory)
    }

    /// Creates a new handle on `factory` configured for local transactions.
    /// Handles are never cached.
    ///
    /// # Errors
    ///
    /// Propagates the provider's handle construction error.
    pub fn handle(&self, factory: &P::Factory) -> FixtureResult<HandleOf<P>> {
        Ok(factory.create_handle(&defaults::handle_properties())?)
    }

    /// Units with a constructed factory, sorted.
    pub fn cached_units(&self) -> Vec<String> {
        let slots: Vec<(String, Slot<P::Factory>)> = self
            .slots
            .lock()
            .iter()
            .map(|(unit, slot)| (unit.clone(), Arc::clone(slot)))
            .collect();
        let mut units: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(unit, _)| unit)
            .collect();
        units.sort();
        units
    }
}
