//! Explicit driver registry, passed once into [`run`](crate::run).

use tracing::warn;

use crate::driver::Driver;
use crate::envelope::{Request, RequestKind, ResponseKind};
use crate::error::{CycleError, Result};

/// Ordered collection of drivers with unique keys.
#[derive(Default)]
pub struct Drivers {
    entries: Vec<Box<dyn Driver>>,
}

impl Drivers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver. Rejects a key that is already taken.
    ///
    /// Two drivers declaring the same response kind are allowed but logged:
    /// subscribers of `Responses::subscribe` cannot tell them apart.
    pub fn insert<D: Driver>(&mut self, driver: D) -> Result<&mut Self> {
        if self.entries.iter().any(|d| d.key() == driver.key()) {
            return Err(CycleError::DuplicateDriver(driver.key().to_string()));
        }

        for existing in &self.entries {
            let overlap: Vec<ResponseKind> = driver
                .response_kinds()
                .iter()
                .filter(|kind| existing.response_kinds().contains(kind))
                .copied()
                .collect();
            if !overlap.is_empty() {
                warn!(
                    driver = driver.key(),
                    other = existing.key(),
                    kinds = ?overlap,
                    "Drivers declare overlapping response kinds"
                );
            }
        }

        self.entries.push(Box::new(driver));
        Ok(self)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<D: Driver>(mut self, driver: D) -> Result<Self> {
        self.insert(driver)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|d| d.key())
    }

    pub(crate) fn routing(&self) -> Routing {
        let mut claimed = Vec::new();
        for driver in &self.entries {
            if driver.request_kinds().is_empty() {
                return Routing { claimed: None };
            }
            claimed.extend_from_slice(driver.request_kinds());
        }
        Routing {
            claimed: Some(claimed),
        }
    }

    pub(crate) fn into_entries(self) -> Vec<Box<dyn Driver>> {
        self.entries
    }
}

/// What the registered drivers claim to handle.
///
/// `None` when at least one driver left its kinds undeclared: in that case
/// no request can be called unrouted.
#[derive(Debug, Clone)]
pub(crate) struct Routing {
    claimed: Option<Vec<RequestKind>>,
}

impl Routing {
    /// True when every driver declared its kinds and none claims this request.
    pub(crate) fn is_unrouted(&self, request: &Request) -> bool {
        match &self.claimed {
            Some(kinds) => !request.is_empty() && !kinds.contains(&request.kind()),
            None => false,
        }
    }
}
