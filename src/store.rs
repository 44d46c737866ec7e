// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistence collaborator.
//!
//! The ledger treats persistence as a document store holding one list per
//! entity kind. It never queries; it loads whole collections at start-up and
//! saves whole collections after mutations.

use crate::error::StoreError;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Entity kinds persisted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Outlets,
    Products,
    Invoices,
    Distributions,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Outlets,
        Collection::Products,
        Collection::Invoices,
        Collection::Distributions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Outlets => "outlets",
            Self::Products => "products",
            Self::Invoices => "invoices",
            Self::Distributions => "distributions",
        }
    }
}

/// Synchronous key-value document store keyed by [`Collection`].
pub trait DocumentStore: Send + Sync {
    /// Returns every record of the collection; an unknown collection is empty.
    fn load(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Replaces the collection with `records`.
    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError>;
}

pub(crate) fn encode<T: Serialize>(items: &[T]) -> Result<Vec<Value>, StoreError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(StoreError::from))
        .collect()
}

pub(crate) fn decode<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, StoreError> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(StoreError::from))
        .collect()
}

/// In-process store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .collections
            .get(&collection)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError> {
        self.collections.insert(collection, records);
        Ok(())
    }
}

/// Directory of pretty-printed JSON files, one per collection.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (and creates if needed) the data directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let path = self.path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError> {
        let path = self.path(collection);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&records)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
