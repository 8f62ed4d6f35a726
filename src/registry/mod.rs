//! Service and stack registries.
//!
//! The [`Registry`] owns every discovered [`Service`] by name and indexes
//! stacks as ordered lists of service names. It is built once by
//! [`discovery`], narrowed by [`selection`], and then handed to fan-out
//! operations.

pub mod discovery;
pub mod selection;


use std::collections::HashMap;

use crate::error::{OrchestraError, Result};
use crate::service::Service;

pub use discovery::{discover, is_local};
pub use selection::{select, SelectionMode};

/// Registry of services and stacks, sharing one name space.
#[derive(Debug, Default)]
pub struct Registry {
    services: HashMap<String, Service>,
    stacks: HashMap<String, Vec<String>>,
    max_name_len: usize,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stack.
    ///
    /// Fails if a service already uses the name. Registering the same stack
    /// twice is a no-op.
    pub fn add_stack(&mut self, name: &str) -> Result<()> {
        if self.services.contains_key(name) {
            return Err(OrchestraError::discovery(format!(
                "Stack {} conflicts with a service of the same name",
                name
            )));
        }
        self.stacks.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Registers a service, indexing it under its stack.
    ///
    /// Fails if the name is already used by a service or a stack.
    pub fn insert(&mut self, service: Service) -> Result<()> {
        if self.services.contains_key(&service.name) {
            return Err(OrchestraError::discovery(format!(
                "Service {} is already registered",
                service.name
            )));
        }
        if self.stacks.contains_key(&service.name) {
            return Err(OrchestraError::discovery(format!(
                "Service {} conflicts with a stack of the same name",
                service.name
            )));
        }

        self.max_name_len = self.max_name_len.max(service.name.len());
        if !service.stack.is_empty() {
            self.stacks
                .entry(service.stack.clone())
                .or_default()
                .push(service.name.clone());
        }
        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    /// Returns a service by name.
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Returns a mutable service by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    /// Returns true if a service has this name.
    pub fn contains_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Returns true if a stack has this name.
    pub fn contains_stack(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// Returns the service names of a stack in discovery order.
    pub fn stack(&self, name: &str) -> Option<&[String]> {
        self.stacks.get(name).map(Vec::as_slice)
    }

    /// Removes a service and its stack index entry.
    ///
    /// A stack emptied by the removal is dropped.
    pub fn remove_service(&mut self, name: &str) -> Option<Service> {
        let service = self.services.remove(name)?;
        if let Some(members) = self.stacks.get_mut(&service.stack) {
            members.retain(|member| member != name);
            if members.is_empty() {
                self.stacks.remove(&service.stack);
            }
        }
        Some(service)
    }

    /// Removes a stack and every service in it.
    pub fn remove_stack(&mut self, name: &str) -> Vec<Service> {
        let members = self.stacks.remove(name).unwrap_or_default();
        members
            .iter()
            .filter_map(|member| self.services.remove(member))
            .collect()
    }

    /// Keeps only the services for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.services.retain(|name, _| keep(name));

        let services = &self.services;
        self.stacks.retain(|_, members| {
            members.retain(|member| services.contains_key(member));
            !members.is_empty()
        });
    }

    /// Returns the number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if there are no services.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterates over services in arbitrary order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Iterates mutably over services in arbitrary order.
    pub fn services_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.services.values_mut()
    }

    /// Returns services ordered by name.
    pub fn sorted(&self) -> Vec<&Service> {
        let mut services: Vec<&Service> = self.services.values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Returns service names ordered by name.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns stack names ordered by name.
    pub fn stack_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stacks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Longest service name seen at discovery, for column alignment.
    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    /// Consumes the registry, yielding owned services ordered by name.
    pub fn into_services(self) -> Vec<Service> {
        let mut services: Vec<Service> = self.services.into_values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }
}
