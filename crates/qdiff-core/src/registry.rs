//! Capability registry.
//!
//! Backends register typed handlers under a [`Role`]. Registration order is
//! the iteration order used by the matrix executor, which keeps failure
//! triage reproducible across runs.

use std::sync::Arc;

use crate::capability::{CapabilityId, Comparator, Exporter, Importer, Role};
use crate::error::{DiffError, Result};

/// In-memory registry of exporters, importers and comparators.
pub struct CapabilityRegistry<C> {
    exporters: Vec<Arc<dyn Exporter<C>>>,
    importers: Vec<Arc<dyn Importer>>,
    comparators: Vec<Arc<dyn Comparator>>,
    order: Vec<(Role, CapabilityId)>,
}

impl<C> Default for CapabilityRegistry<C> {
    fn default() -> Self {
        Self {
            exporters: Vec::new(),
            importers: Vec::new(),
            comparators: Vec::new(),
            order: Vec::new(),
        }
    }
}

impl<C> Clone for CapabilityRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            exporters: self.exporters.clone(),
            importers: self.importers.clone(),
            comparators: self.comparators.clone(),
            order: self.order.clone(),
        }
    }
}

impl<C: 'static> CapabilityRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exporters must also differ in their backend label; two exporters
    /// with one label would share a suggested artifact file.
    pub fn register_exporter<E>(&mut self, exporter: E) -> Result<()>
    where
        E: Exporter<C> + 'static,
    {
        self.check_name(exporter.name())?;
        let id = CapabilityId::new(exporter.name());
        if let Some(existing) = self
            .exporters
            .iter()
            .find(|e| CapabilityId::new(e.name()).backend() == id.backend())
        {
            return Err(DiffError::DuplicateBackend {
                capability: id.to_string(),
                existing: existing.name().to_string(),
                backend: id.backend().to_string(),
            });
        }
        self.order.push((Role::Export, id));
        self.exporters.push(Arc::new(exporter));
        Ok(())
    }

    pub fn register_importer<I>(&mut self, importer: I) -> Result<()>
    where
        I: Importer + 'static,
    {
        self.claim(Role::Import, importer.name())?;
        self.importers.push(Arc::new(importer));
        Ok(())
    }

    pub fn register_comparator<K>(&mut self, comparator: K) -> Result<()>
    where
        K: Comparator + 'static,
    {
        self.claim(Role::Compare, comparator.name())?;
        self.comparators.push(Arc::new(comparator));
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(DiffError::EmptyCapabilityName);
        }
        if self.order.iter().any(|(_, id)| id.as_str() == name) {
            return Err(DiffError::DuplicateCapability(name.to_string()));
        }
        Ok(())
    }

    fn claim(&mut self, role: Role, name: &str) -> Result<()> {
        self.check_name(name)?;
        self.order.push((role, CapabilityId::new(name)));
        Ok(())
    }

    /// Every registered identifier starting with `prefix`, in registration
    /// order. Pure enumeration: no handler is invoked.
    pub fn discover(&self, prefix: &str) -> Vec<CapabilityId> {
        self.order
            .iter()
            .filter(|(_, id)| id.as_str().starts_with(prefix))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Identifiers registered under `role`, in registration order.
    pub fn identifiers(&self, role: Role) -> Vec<CapabilityId> {
        self.order
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// A copy of this registry keeping only capabilities whose identifier
    /// starts with `prefix`.
    pub fn retain(&self, prefix: &str) -> Self {
        let keep = |name: &str| name.starts_with(prefix);
        Self {
            exporters: self
                .exporters
                .iter()
                .filter(|e| keep(e.name()))
                .cloned()
                .collect(),
            importers: self
                .importers
                .iter()
                .filter(|i| keep(i.name()))
                .cloned()
                .collect(),
            comparators: self
                .comparators
                .iter()
                .filter(|c| keep(c.name()))
                .cloned()
                .collect(),
            order: self
                .order
                .iter()
                .filter(|(_, id)| keep(id.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn exporters(&self) -> &[Arc<dyn Exporter<C>>] {
        &self.exporters
    }

    pub fn importers(&self) -> &[Arc<dyn Importer>] {
        &self.importers
    }

    pub fn comparators(&self) -> &[Arc<dyn Comparator>] {
        &self.comparators
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
