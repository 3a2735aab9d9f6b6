//! The search module: registry of drivers, instance configs and index
//! definitions, plus the live connections and the routing ring while open.
//!
//! Every index name routes to exactly one instance. Configuration and
//! registration normally happen before [`SearchModule::open`]; request
//! handling only takes the read lock long enough to pick a connection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use searchmux_core::config::{InstanceConfig, SearchSettings, DEFAULT_DRIVER, DEFAULT_INSTANCE};
use searchmux_core::query::{build_query, QuerySource};
use searchmux_core::signature::query_signature;
use searchmux_core::traits::{AttributeMapper, Connection, Driver, Instance};
use searchmux_core::types::{Capabilities, Index, Row, SearchResult, Value, DEFAULT_PRIMARY};
use searchmux_core::{Error, Result};
use searchmux_memory::MemoryDriver;

use crate::ring::HashRing;

struct Live {
    config: InstanceConfig,
    connection: Arc<dyn Connection>,
}

impl Live {
    fn physical(&self, index: &str) -> String {
        format!("{}{}", self.config.prefix, index)
    }
}

#[derive(Default)]
struct State {
    drivers: HashMap<String, Arc<dyn Driver>>,
    configs: BTreeMap<String, InstanceConfig>,
    indexes: BTreeMap<String, Index>,
    instances: BTreeMap<String, Live>,
    ring: HashRing,
    opened: bool,
}

impl State {
    fn route(&self, index: &str) -> Option<(&String, &Live)> {
        if let Some(name) = self.ring.locate(index) {
            if let Some(found) = self.instances.get_key_value(name) {
                return Some(found);
            }
        }
        self.instances.iter().next()
    }
}

/// Connection, physical index name and definition resolved for one call.
struct Target {
    instance: String,
    connection: Arc<dyn Connection>,
    physical: String,
    index: Index,
}

pub struct SearchModule {
    state: RwLock<State>,
    mapper: Option<Arc<dyn AttributeMapper>>,
    override_existing: bool,
}

impl Default for SearchModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchModule {
    /// A closed module with the memory driver registered under `"memory"`.
    pub fn new() -> Self {
        let module = Self {
            state: RwLock::new(State::default()),
            mapper: None,
            override_existing: false,
        };
        module.register_driver(DEFAULT_DRIVER, Arc::new(MemoryDriver));
        module
    }

    /// Installs the schema collaborator used on writes and read hits.
    pub fn with_mapper(mut self, mapper: Arc<dyn AttributeMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Later registrations replace earlier ones instead of being ignored.
    pub fn with_override(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn register_driver(&self, key: &str, driver: Arc<dyn Driver>) -> bool {
        let mut state = self.state.write();
        insert_entry(&mut state.drivers, key, driver, self.override_existing)
    }

    pub fn register_config(&self, name: &str, config: InstanceConfig) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let mut state = self.state.write();
        if state.configs.contains_key(name) && !self.override_existing {
            return false;
        }
        state.configs.insert(name.to_string(), config);
        true
    }

    pub fn register_configs<I>(&self, configs: I)
    where
        I: IntoIterator<Item = (String, InstanceConfig)>,
    {
        for (name, config) in configs {
            self.register_config(&name, config);
        }
    }

    /// Registers every instance of a parsed `[search]` section.
    pub fn configure(&self, settings: &SearchSettings) {
        self.register_configs(settings.instances.clone());
    }

    /// Blank names are ignored; the stored definition is named after `name`
    /// and its primary key defaults to `"id"`.
    pub fn register_index(&self, name: &str, mut index: Index) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        index.name = name.to_string();
        if index.primary.trim().is_empty() {
            index.primary = DEFAULT_PRIMARY.to_string();
        }
        let mut state = self.state.write();
        if state.indexes.contains_key(name) && !self.override_existing {
            return false;
        }
        state.indexes.insert(name.to_string(), index);
        true
    }

    pub fn register_indexes<I>(&self, indexes: I)
    where
        I: IntoIterator<Item = (String, Index)>,
    {
        for (name, index) in indexes {
            self.register_index(&name, index);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().opened
    }

    /// Connects every configured instance, builds the ring and syncs every
    /// registered index to its owner. Any failure closes what was opened
    /// and leaves the module closed. Opening an open module is a no-op.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.state.write();
        if guard.opened {
            return Ok(());
        }
        let state = &mut *guard;
        if state.configs.is_empty() {
            state.configs.insert(DEFAULT_INSTANCE.to_string(), InstanceConfig::default());
        }

        let mut instances: BTreeMap<String, Live> = BTreeMap::new();
        for (name, config) in &state.configs {
            let mut config = config.clone();
            if config.driver.trim().is_empty() {
                config.driver = DEFAULT_DRIVER.to_string();
            }
            if config.weight <= 0 {
                config.weight = 1;
            }
            let Some(driver) = state.drivers.get(&config.driver).cloned() else {
                close_all(&instances);
                return Err(Error::MissingDriver(config.driver));
            };
            let instance = Instance { name: name.clone(), config };
            let connection = match connect(driver.as_ref(), &instance) {
                Ok(connection) => connection,
                Err(err) => {
                    close_all(&instances);
                    return Err(Error::Connect { instance: name.clone(), reason: err.to_string() });
                }
            };
            instances.insert(name.clone(), Live { config: instance.config, connection });
        }

        state.ring = HashRing::new(instances.iter().map(|(name, live)| (name.as_str(), live.config.weight)));
        state.instances = instances;

        let failed = state.indexes.iter().find_map(|(name, index)| {
            let (instance, live) = state.route(name)?;
            let err = live.connection.sync_index(&live.physical(name), index).err()?;
            Some(Error::Connect { instance: instance.clone(), reason: format!("sync index {name}: {err}") })
        });
        if let Some(err) = failed {
            close_all(&state.instances);
            state.instances.clear();
            state.ring = HashRing::default();
            return Err(err);
        }

        state.opened = true;
        info!(
            instances = state.instances.len(),
            ring_points = state.ring.len(),
            indexes = state.indexes.len(),
            "search module opened"
        );
        Ok(())
    }

    /// Closes every connection and discards the ring. Safe to call twice.
    pub fn close(&self) {
        let mut state = self.state.write();
        if !state.opened {
            return;
        }
        close_all(&state.instances);
        state.instances.clear();
        state.ring = HashRing::default();
        state.opened = false;
        info!("search module closed");
    }

    /// Name of the instance that owns `index`.
    pub fn locate(&self, index: &str) -> Result<String> {
        Ok(self.target(index)?.instance)
    }

    pub fn sync_index(&self, index: &str) -> Result<()> {
        let target = self.target(index)?;
        target.connection.sync_index(&target.physical, &target.index)
    }

    pub fn clear(&self, index: &str) -> Result<()> {
        let target = self.target(index)?;
        target.connection.clear(&target.physical)
    }

    pub fn drop_index(&self, index: &str) -> Result<()> {
        let target = self.target(index)?;
        target.connection.drop_index(&target.physical)
    }

    /// Writes copies of `rows` after id back-fill and schema mapping.
    pub fn upsert(&self, index: &str, rows: &[Row]) -> Result<()> {
        let target = self.target(index)?;
        let prepared = rows
            .iter()
            .map(|row| self.prepare_write(&target.index, row.clone()))
            .collect::<Result<Vec<Row>>>()?;
        target.connection.upsert(&target.physical, prepared)
    }

    pub fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        let target = self.target(index)?;
        target.connection.delete(&target.physical, ids)
    }

    pub fn search<I>(&self, index: &str, keyword: &str, sources: I) -> Result<SearchResult>
    where
        I: IntoIterator<Item = QuerySource>,
    {
        let target = self.target(index)?;
        let query = build_query(keyword, sources);
        let mut result = target.connection.search(&target.physical, &query)?;
        debug!(
            index,
            instance = %target.instance,
            total = result.total,
            took = result.took,
            "search"
        );
        for hit in &mut result.hits {
            if let Some(mapped) = self.prepare_read(&target.index, &hit.payload)? {
                hit.payload = mapped;
            }
        }
        Ok(result)
    }

    pub fn count<I>(&self, index: &str, keyword: &str, sources: I) -> Result<u64>
    where
        I: IntoIterator<Item = QuerySource>,
    {
        let target = self.target(index)?;
        let query = build_query(keyword, sources);
        target.connection.count(&target.physical, &query)
    }

    pub fn suggest(&self, index: &str, text: &str, limit: usize) -> Result<Vec<String>> {
        let target = self.target(index)?;
        target.connection.suggest(&target.physical, text, limit)
    }

    /// Cache key of the normalized query. Works whether or not the module is open.
    pub fn signature<I>(&self, index: &str, keyword: &str, sources: I) -> String
    where
        I: IntoIterator<Item = QuerySource>,
    {
        query_signature(index, &build_query(keyword, sources))
    }

    pub fn capabilities(&self, index: &str) -> Result<Capabilities> {
        Ok(self.target(index)?.connection.capabilities())
    }

    /// Capabilities per instance name; empty while closed.
    pub fn list_capabilities(&self) -> BTreeMap<String, Capabilities> {
        let state = self.state.read();
        state
            .instances
            .iter()
            .map(|(name, live)| (name.clone(), live.connection.capabilities()))
            .collect()
    }

    fn target(&self, index: &str) -> Result<Target> {
        let state = self.state.read();
        if !state.opened {
            return Err(Error::NotReady);
        }
        let (instance, live) = state.route(index).ok_or(Error::NotReady)?;
        let definition = state.indexes.get(index).cloned().unwrap_or_else(|| Index {
            name: index.to_string(),
            primary: DEFAULT_PRIMARY.to_string(),
            ..Index::default()
        });
        Ok(Target {
            instance: instance.clone(),
            connection: Arc::clone(&live.connection),
            physical: live.physical(index),
            index: definition,
        })
    }

    fn mapper_for(&self, index: &Index) -> Option<&dyn AttributeMapper> {
        if index.attributes.is_empty() {
            return None;
        }
        self.mapper.as_deref()
    }

    fn prepare_write(&self, index: &Index, mut row: Row) -> Result<Row> {
        let primary = index.primary_key();
        backfill_id(&mut row, primary);
        let Some(mapper) = self.mapper_for(index) else {
            return Ok(row);
        };
        match mapper.map(&index.attributes, &row, index.strict_write) {
            Ok(mut mapped) => {
                backfill_id(&mut mapped, primary);
                Ok(mapped)
            }
            Err(reason) if index.strict_write => Err(Error::Mapping { index: index.name.clone(), reason }),
            Err(reason) => {
                warn!(index = %index.name, %reason, "write mapping failed, keeping row as given");
                Ok(row)
            }
        }
    }

    /// `None` keeps the payload unchanged.
    fn prepare_read(&self, index: &Index, payload: &Row) -> Result<Option<Row>> {
        let Some(mapper) = self.mapper_for(index) else {
            return Ok(None);
        };
        match mapper.map(&index.attributes, payload, index.strict_read) {
            Ok(mapped) => Ok(Some(mapped)),
            Err(reason) if index.strict_read => Err(Error::Mapping { index: index.name.clone(), reason }),
            Err(reason) => {
                warn!(index = %index.name, %reason, "read mapping failed, returning stored row");
                Ok(None)
            }
        }
    }
}

fn insert_entry<T>(map: &mut HashMap<String, T>, key: &str, value: T, override_existing: bool) -> bool {
    let key = key.trim();
    if key.is_empty() || (map.contains_key(key) && !override_existing) {
        return false;
    }
    map.insert(key.to_string(), value);
    true
}

fn connect(driver: &dyn Driver, instance: &Instance) -> Result<Arc<dyn Connection>> {
    let connection = driver.connect(instance)?;
    if let Err(err) = connection.open() {
        if let Err(close_err) = connection.close() {
            warn!(instance = %instance.name, err = %close_err, "close search instance failed");
        }
        return Err(err);
    }
    Ok(connection)
}

fn close_all(instances: &BTreeMap<String, Live>) {
    for (name, live) in instances {
        if let Err(err) = live.connection.close() {
            warn!(instance = %name, %err, "close search instance failed");
        }
    }
}

/// Makes the primary-key field and `"id"` carry the same identifier when
/// only one of them is present.
fn backfill_id(row: &mut Row, primary: &str) {
    if primary == DEFAULT_PRIMARY {
        return;
    }
    let present = |v: Option<&Value>| v.filter(|v| !v.is_null()).cloned();
    match (present(row.get(primary)), present(row.get(DEFAULT_PRIMARY))) {
        (Some(pk), None) => {
            row.insert(DEFAULT_PRIMARY.to_string(), pk);
        }
        (None, Some(id)) => {
            row.insert(primary.to_string(), id);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn backfill_copies_whichever_id_is_present() {
        let mut only_pk = row(&[("sku", Value::from("p1"))]);
        backfill_id(&mut only_pk, "sku");
        assert_eq!(only_pk["id"], Value::from("p1"));

        let mut only_id = row(&[("id", Value::from(7))]);
        backfill_id(&mut only_id, "sku");
        assert_eq!(only_id["sku"], Value::from(7));

        let mut both = row(&[("id", Value::from("a")), ("sku", Value::from("b"))]);
        backfill_id(&mut both, "sku");
        assert_eq!(both["id"], Value::from("a"));
        assert_eq!(both["sku"], Value::from("b"));
    }

    #[test]
    fn registration_is_first_wins_unless_overriding() {
        let module = SearchModule::new();
        let heavy = InstanceConfig { weight: 5, ..InstanceConfig::default() };
        assert!(module.register_config("a", InstanceConfig::default()));
        assert!(!module.register_config("a", heavy.clone()));
        assert!(!module.register_config("  ", InstanceConfig::default()));
        assert_eq!(module.state.read().configs["a"].weight, 1);

        let module = SearchModule::new().with_override(true);
        module.register_config("a", InstanceConfig::default());
        assert!(module.register_config("a", heavy));
        assert_eq!(module.state.read().configs["a"].weight, 5);
    }

    #[test]
    fn index_registration_fills_name_and_primary() {
        let module = SearchModule::new();
        assert!(module.register_index(" products ", Index { name: "other".into(), ..Index::default() }));
        assert!(!module.register_index("", Index::default()));
        let state = module.state.read();
        let stored = &state.indexes["products"];
        assert_eq!(stored.name, "products");
        assert_eq!(stored.primary, "id");
    }

    #[test]
    fn open_without_configs_uses_default_memory_instance() {
        let module = SearchModule::new();
        module.open().expect("open");
        assert_eq!(module.locate("anything").expect("locate"), DEFAULT_INSTANCE);
        module.close();
    }
}
