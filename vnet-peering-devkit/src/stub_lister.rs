/*!
Stub peering lister

Replays scripted pages instead of calling Azure. Each call to `list_peerings`
consumes the next scripted cycle; once the script is exhausted every call
returns an empty listing. Records are stamped with the requested target, as
the ARM lister does.
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use vnet_peering_exporter::{
    ListError, PageStream, PeeringLister, PeeringPage, PeeringRecord, PeeringTarget,
};

/// One scripted page.
#[derive(Debug, Clone)]
pub enum StubPage {
    Records(Vec<PeeringRecord>),
    /// The page fetch fails with a provider error
    Fail(String),
    /// The page fetch never completes
    Hang,
}

#[derive(Clone, Default)]
pub struct StubLister {
    cycles: Arc<Mutex<VecDeque<Vec<StubPage>>>>,
    calls: Arc<Mutex<Vec<PeeringTarget>>>,
}

impl StubLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages returned by the next unscripted call
    pub fn with_cycle(self, pages: Vec<StubPage>) -> Self {
        self.push_cycle(pages);
        self
    }

    pub fn push_cycle(&self, pages: Vec<StubPage>) {
        self.cycles.lock().unwrap().push_back(pages);
    }

    /// Targets passed to `list_peerings`, oldest first
    pub fn calls(&self) -> Vec<PeeringTarget> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PeeringLister for StubLister {
    fn list_peerings<'a>(&'a self, target: &'a PeeringTarget) -> PageStream<'a> {
        self.calls.lock().unwrap().push(target.clone());
        let pages = self.cycles.lock().unwrap().pop_front().unwrap_or_default();
        tracing::debug!("[stub] listing {} with {} scripted pages", target, pages.len());

        stream::iter(pages)
            .then(move |page| async move {
                let page: Result<PeeringPage, ListError> = match page {
                    StubPage::Records(records) => Ok(records
                        .into_iter()
                        .map(|mut record| {
                            record.resource_group = target.resource_group().to_string();
                            record.vnet_name = target.vnet_name().to_string();
                            record
                        })
                        .collect()),
                    StubPage::Fail(message) => Err(ListError::Provider(message)),
                    StubPage::Hang => futures::future::pending().await,
                };
                page
            })
            .boxed()
    }
}

/// Builds [`PeeringRecord`]s for tests
pub struct PeeringBuilder {
    record: PeeringRecord,
}

impl PeeringBuilder {
    /// A connected peering with no sync level
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            record: PeeringRecord {
                name: name.into(),
                resource_group: String::new(),
                vnet_name: String::new(),
                peering_state: "Connected".to_string(),
                sync_level: None,
            },
        }
    }

    pub fn state<S: Into<String>>(mut self, state: S) -> Self {
        self.record.peering_state = state.into();
        self
    }

    pub fn sync_level<S: Into<String>>(mut self, sync_level: S) -> Self {
        self.record.sync_level = Some(sync_level.into());
        self
    }

    pub fn build(self) -> PeeringRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn target() -> PeeringTarget {
        PeeringTarget::new("rg-network", "vnet-hub").unwrap()
    }

    #[tokio::test]
    async fn test_replays_scripted_cycles() {
        let lister = StubLister::new()
            .with_cycle(vec![
                StubPage::Records(vec![PeeringBuilder::new("peerA").build()]),
                StubPage::Fail("throttled".into()),
            ])
            .with_cycle(vec![StubPage::Records(vec![])]);
        let target = target();

        let pages: Vec<_> = lister.list_peerings(&target).collect().await;
        assert_eq!(pages.len(), 2);
        let first = pages[0].as_ref().unwrap();
        assert_eq!(first[0].name, "peerA");
        assert_eq!(first[0].resource_group, "rg-network");
        assert_eq!(first[0].vnet_name, "vnet-hub");
        assert!(matches!(pages[1], Err(ListError::Provider(ref m)) if m == "throttled"));

        let pages: Vec<_> = lister.list_peerings(&target).collect().await;
        assert_eq!(pages.len(), 1);

        let pages: Vec<_> = lister.list_peerings(&target).collect().await;
        assert!(pages.is_empty());
        assert_eq!(lister.call_count(), 3);
        assert_eq!(lister.calls()[0], target);
    }

    #[test]
    fn test_peering_builder() {
        let record = PeeringBuilder::new("peerB")
            .state("Disconnected")
            .sync_level("LocalNotInSync")
            .build();
        assert_eq!(record.name, "peerB");
        assert_eq!(record.peering_state, "Disconnected");
        assert_eq!(record.sync_level.as_deref(), Some("LocalNotInSync"));
    }
}
