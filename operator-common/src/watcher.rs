//! Run a long lived watch on the backend, re-establishing it when it ends.

use crate::error::ResourceError;
use async_trait::async_trait;
use futures::{future::FutureExt, stream::BoxStream, StreamExt};
use kube::{api::WatchEvent, Api, Resource};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::sync::watch;

/// Resource version which starts a watch with the current state of all resources.
const INITIAL_VERSION: &str = "0";

/// The backend dropped the resource version we tried to resume from.
const GONE: u16 = 410;

pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, ResourceError>>;

/// Something that can be watched.
#[async_trait]
pub trait WatchSource<K>: Send + Sync {
    /// Start watching, resuming after the resource version, if there is one.
    async fn watch(&self, resource_version: Option<String>) -> Result<WatchStream<K>, ResourceError>;
}

#[async_trait]
impl<K> WatchSource<K> for Api<K>
where
    K: Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    async fn watch(&self, resource_version: Option<String>) -> Result<WatchStream<K>, ResourceError> {
        let version = resource_version.unwrap_or_else(|| INITIAL_VERSION.into());
        let stream = Api::watch(self, &Default::default(), &version).await?;
        Ok(stream.map(|event| event.map_err(ResourceError::from)).boxed())
    }
}

#[async_trait]
impl<K, T> WatchSource<K> for Arc<T>
where
    K: 'static,
    T: WatchSource<K> + ?Sized,
{
    async fn watch(&self, resource_version: Option<String>) -> Result<WatchStream<K>, ResourceError> {
        self.as_ref().watch(resource_version).await
    }
}

/// A change of a resource, as seen by the watch.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> ResourceEvent<K> {
    pub fn resource(&self) -> &K {
        match self {
            Self::Added(resource) | Self::Modified(resource) | Self::Deleted(resource) => resource,
        }
    }
}

/// Handle resource events, one at a time.
#[async_trait]
pub trait WatchHandler<K>: Send + Sync {
    async fn handle(&self, event: ResourceEvent<K>) -> anyhow::Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
}

/// Consume a watch, handing over events to the handler in order.
///
/// When the stream ends or fails, the watch is re-issued right away, resuming from the last seen
/// resource version. Only failing to open a watch backs off, by `retry_delay`.
pub struct Watcher<K, S, H> {
    source: S,
    handler: H,
    retry_delay: Duration,
    state: WatcherState,
    resource_version: Option<String>,
    _marker: std::marker::PhantomData<fn() -> K>,
}

impl<K, S, H> Watcher<K, S, H>
where
    K: Resource + Debug + Send + 'static,
    S: WatchSource<K>,
    H: WatchHandler<K>,
{
    pub fn new(source: S, handler: H, retry_delay: Duration) -> Self {
        Self {
            source,
            handler,
            retry_delay,
            state: WatcherState::Idle,
            resource_version: None,
            _marker: Default::default(),
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    /// Run until the shutdown signal flips to `true`, or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            log::debug!(
                "Starting watch (resourceVersion: {:?})",
                self.resource_version
            );

            let stream = tokio::select! {
                _ = shutdown.changed() => break,
                stream = self.source.watch(self.resource_version.clone()) => stream,
            };

            let mut stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    log::warn!("Failed to start watch: {err}");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            self.state = WatcherState::Watching;

            loop {
                let next = tokio::select! {
                    _ = shutdown.changed() => {
                        self.state = WatcherState::Idle;
                        return;
                    },
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(event)) => self.process(event).await,
                    Some(Err(err)) => {
                        log::warn!("Watch failed: {err}");
                        break;
                    }
                    None => {
                        log::info!("Watch closed");
                        break;
                    }
                }
            }

            self.state = WatcherState::Idle;
        }

        log::info!("Watcher shut down");
    }

    async fn process(&mut self, event: WatchEvent<K>) {
        let event = match event {
            WatchEvent::Added(resource) => ResourceEvent::Added(resource),
            WatchEvent::Modified(resource) => ResourceEvent::Modified(resource),
            WatchEvent::Deleted(resource) => ResourceEvent::Deleted(resource),
            WatchEvent::Bookmark(bookmark) => {
                self.resource_version = Some(bookmark.metadata.resource_version);
                return;
            }
            WatchEvent::Error(err) => {
                log::warn!("Watch reported an error: {err:?}");
                if err.code == GONE {
                    // start over with the current state
                    self.resource_version = None;
                }
                return;
            }
        };

        if let Some(version) = &event.resource().meta().resource_version {
            self.resource_version = Some(version.clone());
        }

        match AssertUnwindSafe(self.handler.handle(event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("Failed to handle event: {err:#}"),
            Err(_) => log::error!("Event handler panicked"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::stream;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::{api::ObjectMeta, error::ErrorResponse};
    use std::sync::{Arc, Mutex};

    fn init() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    }

    fn cm(name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                resource_version: Some(version.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Hands out one scripted stream per watch call, then nothing.
    #[derive(Default)]
    struct ScriptedSource {
        streams: Mutex<Vec<Result<Vec<Result<WatchEvent<ConfigMap>, ResourceError>>, ResourceError>>>,
        requests: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl WatchSource<ConfigMap> for ScriptedSource {
        async fn watch(
            &self,
            resource_version: Option<String>,
        ) -> Result<WatchStream<ConfigMap>, ResourceError> {
            self.requests.lock().unwrap().push(resource_version);
            let mut streams = self.streams.lock().unwrap();
            if streams.is_empty() {
                return Ok(stream::pending().boxed());
            }
            let events = streams.remove(0)?;
            Ok(stream::iter(events).boxed())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        tx: Arc<Mutex<Option<tokio::sync::mpsc::UnboundedSender<()>>>>,
    }

    #[async_trait]
    impl WatchHandler<ConfigMap> for Recorder {
        async fn handle(&self, event: ResourceEvent<ConfigMap>) -> anyhow::Result<()> {
            let name = event.resource().metadata.name.clone().unwrap_or_default();
            self.seen.lock().unwrap().push(name.clone());
            if let Some(tx) = self.tx.lock().unwrap().as_ref() {
                let _ = tx.send(());
            }
            match name.as_str() {
                "fail" => anyhow::bail!("Failed"),
                "panic" => panic!("Panic in handler"),
                _ => Ok(()),
            }
        }
    }

    async fn run(
        source: ScriptedSource,
        expected_events: usize,
    ) -> (Vec<String>, Vec<Option<String>>) {
        init();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let recorder = Recorder::default();
        *recorder.tx.lock().unwrap() = Some(tx);
        let requests = source.requests.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = Watcher::new(source, recorder.clone(), Duration::from_millis(10));
        let task = tokio::spawn(watcher.run(shutdown_rx));

        for _ in 0..expected_events {
            rx.recv().await.unwrap();
        }
        // let the watcher settle on the next stream
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        let requests = requests.lock().unwrap().clone();
        (seen, requests)
    }

    #[tokio::test]
    async fn test_resume_after_close() {
        let source = ScriptedSource::default();
        *source.streams.lock().unwrap() = vec![
            Ok(vec![
                Ok(WatchEvent::Added(cm("a", "1"))),
                Ok(WatchEvent::Modified(cm("a", "2"))),
            ]),
            Ok(vec![Ok(WatchEvent::Deleted(cm("a", "3")))]),
        ];

        let (seen, requests) = run(source, 3).await;

        assert_eq!(seen, vec!["a", "a", "a"]);
        assert_eq!(
            requests,
            vec![None, Some("2".to_string()), Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_resume_after_error() {
        let source = ScriptedSource::default();
        *source.streams.lock().unwrap() = vec![
            Ok(vec![
                Ok(WatchEvent::Added(cm("a", "5"))),
                Err(ResourceError::backend("connection reset")),
                Ok(WatchEvent::Added(cm("never", "6"))),
            ]),
            Err(ResourceError::backend("unavailable")),
            Ok(vec![Ok(WatchEvent::Added(cm("b", "7")))]),
        ];

        let (seen, requests) = run(source, 2).await;

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(
            requests,
            vec![
                None,
                Some("5".to_string()),
                Some("5".to_string()),
                Some("7".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_failures() {
        let source = ScriptedSource::default();
        *source.streams.lock().unwrap() = vec![Ok(vec![
            Ok(WatchEvent::Added(cm("fail", "1"))),
            Ok(WatchEvent::Added(cm("panic", "2"))),
            Ok(WatchEvent::Added(cm("ok", "3"))),
        ])];

        let (seen, requests) = run(source, 3).await;

        assert_eq!(seen, vec!["fail", "panic", "ok"]);
        // the panic didn't end the stream
        assert_eq!(requests, vec![None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn test_bookmark_and_gone() {
        let source = ScriptedSource::default();
        *source.streams.lock().unwrap() = vec![
            Ok(vec![
                Ok(WatchEvent::Added(cm("a", "1"))),
                Ok(serde_json::from_value(serde_json::json!({
                    "type": "BOOKMARK",
                    "object": {
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": { "resourceVersion": "10" }
                    }
                }))
                .unwrap()),
            ]),
            Ok(vec![Ok(WatchEvent::Error(ErrorResponse {
                status: "Failure".into(),
                message: "too old resource version".into(),
                reason: "Expired".into(),
                code: 410,
            }))]),
            Ok(vec![Ok(WatchEvent::Added(cm("b", "20")))]),
        ];

        let (seen, requests) = run(source, 2).await;

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(
            requests,
            vec![
                None,
                Some("10".to_string()),
                None,
                Some("20".to_string())
            ]
        );
    }
}
