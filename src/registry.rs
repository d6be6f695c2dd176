//! Name to session routing for every configured printer.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    config::PrinterConfig,
    error::{Error, Result},
    session::{ConnectTiming, ConnectionState, Session},
    traits::Connector,
};

/// The outcome of one session's autoconnect.
#[derive(Debug)]
pub struct ConnectOutcome {
    /// The printer.
    pub name: String,

    /// What its connect returned.
    pub result: Result<ConnectionState>,
}

/// Every printer session, keyed by name. The set of names is fixed once
/// built.
pub struct Registry<C: Connector> {
    sessions: BTreeMap<String, Session<C>>,
}

impl<C: Connector> Registry<C> {
    /// Create one Disconnected session per config. Fails with
    /// [Error::DuplicateName] before creating anything if two configs share
    /// a name.
    pub fn build(configs: Vec<PrinterConfig>, connector: Arc<C>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for config in &configs {
            if !seen.insert(config.name.as_str()) {
                return Err(Error::DuplicateName(config.name.clone()));
            }
        }

        let sessions = configs
            .into_iter()
            .map(|config| (config.name.clone(), Session::new(config, connector.clone())))
            .collect();

        Ok(Self { sessions })
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Result<&Session<C>> {
        self.sessions
            .get(name)
            .ok_or_else(|| Error::UnknownPrinter(name.to_owned()))
    }

    /// Sessions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Session<C>> {
        self.sessions.values()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no printers are configured.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Connect every session concurrently. One printer failing never fails
    /// the others; every outcome is logged and returned.
    pub async fn autoconnect_all(&self, timing: &ConnectTiming) -> Result<Vec<ConnectOutcome>> {
        if self.sessions.is_empty() {
            return Err(Error::NoPrinters);
        }

        let outcomes = futures::future::join_all(self.sessions.values().map(|session| async move {
            let result = session.connect(timing).await;
            match &result {
                Ok(state) => tracing::info!(printer = session.name(), state = %state, "autoconnect finished"),
                Err(err) => tracing::warn!(printer = session.name(), error = %err, "autoconnect failed"),
            }
            ConnectOutcome {
                name: session.name().to_owned(),
                result,
            }
        }))
        .await;

        Ok(outcomes)
    }

    /// Disconnect every session concurrently.
    pub async fn disconnect_all(&self) {
        futures::future::join_all(self.sessions.values().map(|session| session.disconnect())).await;
        tracing::info!(printers = self.sessions.len(), "all printers disconnected");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::FakeConnector;

    fn configs(names: &[&str]) -> Vec<PrinterConfig> {
        names.iter().map(|name| PrinterConfig::noop(name)).collect()
    }

    #[test]
    fn test_duplicate_names_build_nothing() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::ZERO));
        let err = Registry::build(configs(&["a", "b", "a"]), connector).err().unwrap();
        assert!(matches!(err, Error::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn test_lookup_is_exact() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::ZERO));
        let registry = Registry::build(configs(&["Ender", "babu"]), connector).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("Ender").unwrap().name(), "Ender");
        assert!(matches!(registry.get("ender"), Err(Error::UnknownPrinter(name)) if name == "ender"));
        assert_eq!(
            registry.iter().map(|s| s.name()).collect::<Vec<_>>(),
            vec!["Ender", "babu"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoconnect_isolates_failures() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::from_millis(200)));
        connector.set_never_ready("p2");
        let registry = Registry::build(configs(&["p1", "p2"]), connector.clone()).unwrap();

        let outcomes = registry.autoconnect_all(&ConnectTiming::default()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].result, Ok(ConnectionState::Ready)));
        assert!(matches!(outcomes[1].result, Err(Error::ConnectTimeout(_))));
        assert_eq!(registry.get("p1").unwrap().state().await, ConnectionState::Ready);
        assert_eq!(registry.get("p2").unwrap().state().await, ConnectionState::Failed);
        assert_eq!(connector.stats.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoconnect_runs_concurrently() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::from_secs(1)));
        let registry = Registry::build(configs(&["a", "b", "c"]), connector).unwrap();
        let started = tokio::time::Instant::now();

        registry.autoconnect_all(&ConnectTiming::default()).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_autoconnect_without_printers() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::ZERO));
        let registry = Registry::build(vec![], connector).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.autoconnect_all(&ConnectTiming::default()).await,
            Err(Error::NoPrinters)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_all() {
        let connector = Arc::new(FakeConnector::ready_after(Duration::ZERO));
        let registry = Registry::build(configs(&["a", "b"]), connector.clone()).unwrap();
        registry.autoconnect_all(&ConnectTiming::default()).await.unwrap();
        assert_eq!(connector.stats.live(), 2);

        registry.disconnect_all().await;

        assert_eq!(connector.stats.live(), 0);
        for session in registry.iter() {
            assert_eq!(session.state().await, ConnectionState::Disconnected);
        }
    }
}
