//! ProxyCollection: every proxy the daemon runs, by name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use venom_core::{ProxyConfig, ProxyError};

use crate::proxy::Proxy;
use crate::registry::ToxicRegistry;

pub struct ProxyCollection {
    registry: Arc<ToxicRegistry>,
    proxies: Mutex<HashMap<String, Arc<Proxy>>>,
}

impl Default for ProxyCollection {
    fn default() -> Self {
        Self::new(Arc::new(ToxicRegistry::builtin()))
    }
}

impl ProxyCollection {
    pub fn new(registry: Arc<ToxicRegistry>) -> Self {
        Self {
            registry,
            proxies: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ToxicRegistry> {
        &self.registry
    }

    /// Create a proxy, starting it when the config says so.
    pub async fn add(&self, config: ProxyConfig) -> Result<Arc<Proxy>, ProxyError> {
        validate(&config)?;
        let mut proxies = self.proxies.lock().await;
        if proxies.contains_key(&config.name) {
            return Err(ProxyError::AlreadyExists);
        }
        self.insert(&mut proxies, config).await
    }

    /// Make the named proxy match `config`. A proxy with the same addresses
    /// is kept as is, toxics included; otherwise it is stopped and replaced.
    pub async fn add_or_replace(&self, config: ProxyConfig) -> Result<Arc<Proxy>, ProxyError> {
        validate(&config)?;
        let mut proxies = self.proxies.lock().await;
        if let Some(existing) = proxies.get(&config.name) {
            if existing.listen().await == config.listen
                && existing.upstream().await == config.upstream
            {
                return Ok(Arc::clone(existing));
            }
            existing.stop().await;
        }
        self.insert(&mut proxies, config).await
    }

    async fn insert(
        &self,
        proxies: &mut HashMap<String, Arc<Proxy>>,
        config: ProxyConfig,
    ) -> Result<Arc<Proxy>, ProxyError> {
        let enabled = config.enabled;
        let proxy = Arc::new(Proxy::new(config, Arc::clone(&self.registry)));
        if enabled {
            proxy.start().await?;
        }
        proxies.insert(proxy.name().to_string(), Arc::clone(&proxy));
        Ok(proxy)
    }

    /// Create or replace a whole list of proxies. Every config is checked
    /// before any proxy changes; after that the first failure stops the run
    /// and the proxies handled before it stay in place.
    pub async fn populate(&self, configs: Vec<ProxyConfig>) -> Result<Vec<Arc<Proxy>>, ProxyError> {
        for config in &configs {
            validate(config)?;
        }

        let mut populated = Vec::with_capacity(configs.len());
        for config in configs {
            let name = config.name.clone();
            let proxy = self.add_or_replace(config).await.map_err(|e| {
                tracing::warn!(proxy = %name, error = %e, "populate failed");
                e
            })?;
            populated.push(proxy);
        }
        tracing::info!(count = populated.len(), "proxies populated");
        Ok(populated)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Proxy>, ProxyError> {
        self.proxies
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or(ProxyError::NotFound)
    }

    /// All proxies, sorted by name.
    pub async fn list(&self) -> Vec<Arc<Proxy>> {
        let mut proxies: Vec<_> = self.proxies.lock().await.values().cloned().collect();
        proxies.sort_by(|a, b| a.name().cmp(b.name()));
        proxies
    }

    /// Stop and forget a proxy.
    pub async fn remove(&self, name: &str) -> Result<(), ProxyError> {
        let proxy = self
            .proxies
            .lock()
            .await
            .remove(name)
            .ok_or(ProxyError::NotFound)?;
        proxy.stop().await;
        tracing::info!(proxy = %name, "proxy deleted");
        Ok(())
    }

    pub async fn clear(&self) {
        let drained: Vec<_> = self.proxies.lock().await.drain().collect();
        for (_, proxy) in drained {
            proxy.stop().await;
        }
    }

    /// Re-enable every proxy and remove all toxics.
    pub async fn reset_state(&self) -> Result<(), ProxyError> {
        for proxy in self.list().await {
            proxy.start().await?;
            proxy.toxics().reset_toxics().await;
        }
        tracing::info!("proxies reset");
        Ok(())
    }
}

fn validate(config: &ProxyConfig) -> Result<(), ProxyError> {
    if config.name.is_empty() {
        return Err(ProxyError::MissingField("name"));
    }
    if config.upstream.is_empty() {
        return Err(ProxyError::MissingField("upstream"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use venom_core::{ProxyPatch, ToxicRequest};

    use super::*;

    fn config(name: &str) -> ProxyConfig {
        ProxyConfig::new(name, "127.0.0.1:0", "127.0.0.1:6379")
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_missing_fields() {
        let proxies = ProxyCollection::default();
        proxies.add(config("redis")).await.unwrap();

        assert!(matches!(
            proxies.add(config("redis")).await.unwrap_err(),
            ProxyError::AlreadyExists
        ));
        assert!(matches!(
            proxies.add(config("")).await.unwrap_err(),
            ProxyError::MissingField("name")
        ));
        let mut no_upstream = config("x");
        no_upstream.upstream.clear();
        assert!(matches!(
            proxies.add(no_upstream).await.unwrap_err(),
            ProxyError::MissingField("upstream")
        ));
    }

    #[tokio::test]
    async fn disabled_proxies_are_not_started() {
        let proxies = ProxyCollection::default();
        let mut cfg = config("idle");
        cfg.enabled = false;
        let proxy = proxies.add(cfg).await.unwrap();
        assert!(!proxy.is_enabled().await);
        assert_eq!(proxy.listen().await, "127.0.0.1:0");
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let proxies = ProxyCollection::default();
        let taken = proxies.add(config("first")).await.unwrap().listen().await;

        let err = proxies
            .add(ProxyConfig::new("second", taken, "127.0.0.1:6379"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Bind(..)));
        assert!(matches!(
            proxies.get("second").await.unwrap_err(),
            ProxyError::NotFound
        ));
    }

    #[tokio::test]
    async fn populate_validates_everything_first() {
        let proxies = ProxyCollection::default();
        let err = proxies
            .populate(vec![config("a"), config("")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingField("name")));
        assert!(proxies.list().await.is_empty());
    }

    #[tokio::test]
    async fn populate_keeps_unchanged_proxies() {
        let proxies = ProxyCollection::default();
        let mut cfg = config("a");
        cfg.enabled = false;
        let first = proxies.populate(vec![cfg.clone()]).await.unwrap();
        first[0]
            .toxics()
            .add_toxic(ToxicRequest::new("latency"))
            .await
            .unwrap();

        let again = proxies
            .populate(vec![cfg.clone(), config("b")])
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first[0], &again[0]));
        assert_eq!(again[0].toxics().list_toxics().await.len(), 1);

        cfg.upstream = "127.0.0.1:6380".into();
        let replaced = proxies.populate(vec![cfg]).await.unwrap();
        assert!(!Arc::ptr_eq(&first[0], &replaced[0]));
        assert!(replaced[0].toxics().list_toxics().await.is_empty());

        let names: Vec<_> = proxies
            .list()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn reset_state_enables_and_clears() {
        let proxies = ProxyCollection::default();
        let proxy = proxies.add(config("a")).await.unwrap();
        proxy
            .toxics()
            .add_toxic(ToxicRequest::new("timeout"))
            .await
            .unwrap();
        proxy
            .update(ProxyPatch {
                enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        proxies.reset_state().await.unwrap();
        assert!(proxy.is_enabled().await);
        assert!(proxy.toxics().list_toxics().await.is_empty());
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let proxies = ProxyCollection::default();
        proxies.add(config("a")).await.unwrap();
        proxies.add(config("b")).await.unwrap();

        proxies.remove("a").await.unwrap();
        assert!(matches!(
            proxies.remove("a").await.unwrap_err(),
            ProxyError::NotFound
        ));
        proxies.clear().await;
        assert!(proxies.list().await.is_empty());
    }
}
