use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use casket_address::{
    ContentAddresser, HexKeyGenerator, KeyGenerator, MagicContentTyper, ProbingDeduper,
};
use casket_store::{
    BlobStore, FsTransport, TransportBlobStore, TransportCache, DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given, if present.
pub const DEFAULT_CONFIG_FILE: &str = "casket.toml";

/// Store backed by the local directory transport.
pub type LocalStore = TransportBlobStore<FsTransport>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasketConfig {
    pub default_store: String,
    pub concurrency: usize,
    pub stores: BTreeMap<String, StoreConfig>,
    pub addressing: AddressingConfig,
}

impl Default for CasketConfig {
    fn default() -> Self {
        let mut stores = BTreeMap::new();
        stores.insert("local".to_string(), StoreConfig::at(".casket"));
        Self {
            default_store: "local".into(),
            concurrency: DEFAULT_CONCURRENCY,
            stores,
            addressing: AddressingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl StoreConfig {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    pub key_prefix: Option<String>,
    pub shard_levels: usize,
    pub sniff_content_type: bool,
}

impl CasketConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid casket config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, or `casket.toml` if it exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.stores.contains_key(&self.default_store) {
            bail!("default store {:?} is not configured", self.default_store);
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn store(&self, name: &str) -> anyhow::Result<&StoreConfig> {
        match self.stores.get(name) {
            Some(store) => Ok(store),
            None => bail!("unknown store {name:?}"),
        }
    }

    pub fn key_generator(&self) -> HexKeyGenerator {
        let mut keys = HexKeyGenerator::new().with_shard_levels(self.addressing.shard_levels);
        if let Some(prefix) = &self.addressing.key_prefix {
            keys = keys.with_prefix(prefix.clone());
        }
        keys
    }
}

/// Opens configured stores by name, once per name.
pub struct StoreRegistry {
    config: CasketConfig,
    opened: TransportCache<String, LocalStore>,
}

impl StoreRegistry {
    pub fn new(config: CasketConfig) -> Self {
        Self {
            config,
            opened: TransportCache::new(),
        }
    }

    pub fn config(&self) -> &CasketConfig {
        &self.config
    }

    pub async fn open(&self, name: Option<&str>) -> anyhow::Result<Arc<LocalStore>> {
        let name = name.unwrap_or(&self.config.default_store).to_string();
        let store = self.config.store(&name)?.clone();
        self.opened
            .get_or_try_init(&name, || async move {
                let transport = FsTransport::open(&store.root)
                    .await
                    .with_context(|| format!("opening store at {}", store.root.display()))?;
                tracing::debug!(root = %store.root.display(), "opened store");
                Ok::<_, anyhow::Error>(Arc::new(TransportBlobStore::new(
                    transport.with_page_size(store.page_size),
                )))
            })
            .await
    }

    /// Content addresser over `store`, configured from the `[addressing]`
    /// table. Dedupe probes the store itself, so it survives across runs.
    pub fn addresser(&self, store: Arc<LocalStore>) -> ContentAddresser {
        let store: Arc<dyn BlobStore> = store;
        let keys: Arc<dyn KeyGenerator> = Arc::new(self.config.key_generator());
        let addresser = ContentAddresser::new(Arc::clone(&store))
            .with_key_generator(Arc::clone(&keys))
            .with_deduper(Arc::new(ProbingDeduper::new(store, keys)));
        if self.config.addressing.sniff_content_type {
            addresser.with_content_typer(Arc::new(MagicContentTyper))
        } else {
            addresser
        }
    }
}
