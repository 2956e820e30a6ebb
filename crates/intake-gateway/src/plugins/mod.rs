// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Output plugins and the host that runs them.
//!
//! A plugin subscribes to the topics it cares about when started; the host
//! then owns one consumption task per subscription. There is no explicit stop:
//! closing the broker ends every subscription and the tasks return.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Subscription};
use crate::config::PluginSettings;
use crate::errors::PluginError;

pub mod elasticsearch;
pub mod logger;

pub use elasticsearch::ElasticsearchPlugin;
pub use logger::LoggerPlugin;

/// Names accepted under `plugins` in the configuration.
pub const AVAILABLE_PLUGINS: [&str; 2] = [logger::NAME, elasticsearch::NAME];

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Performs setup and subscribes to the plugin's topics.
    async fn start(&self, broker: &Broker) -> Result<Vec<Subscription>, PluginError>;

    /// Handles one message. Errors are dealt with here; nothing is propagated
    /// back to the broker.
    async fn process(&self, topic: &str, message: Bytes);
}

/// Builds the plugin registered under `name`.
pub fn plugin_from_config(
    name: &str,
    settings: &PluginSettings,
) -> Result<Arc<dyn Plugin>, PluginError> {
    match name {
        logger::NAME => Ok(Arc::new(LoggerPlugin)),
        elasticsearch::NAME => Ok(Arc::new(ElasticsearchPlugin::from_settings(settings)?)),
        _ => Err(PluginError::UnknownPlugin(name.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Created,
    Started,
    /// Consuming, with this many live subscription loops.
    Running(usize),
    Stopped,
}

pub struct PluginHost {
    broker: Arc<Broker>,
    states: HashMap<String, PluginState>,
    loops: JoinSet<String>,
}

impl PluginHost {
    #[must_use]
    pub fn new(broker: Arc<Broker>) -> Self {
        PluginHost {
            broker,
            states: HashMap::new(),
            loops: JoinSet::new(),
        }
    }

    /// Starts `plugin` and spawns one consumption loop per subscription.
    ///
    /// A plugin name can only be started once.
    pub async fn start(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.states.contains_key(&name) {
            return Err(PluginError::AlreadyStarted(name));
        }
        self.states.insert(name.clone(), PluginState::Created);

        let subscriptions = match plugin.start(&self.broker).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                self.states.insert(name, PluginState::Stopped);
                return Err(e);
            }
        };
        self.states.insert(name.clone(), PluginState::Started);

        let count = subscriptions.len();
        for mut subscription in subscriptions {
            let plugin = Arc::clone(&plugin);
            let name = name.clone();
            self.loops.spawn(async move {
                let topic = subscription.topic().to_string();
                debug!("Plugin {name} consuming {topic}");
                while let Some(message) = subscription.recv().await {
                    plugin.process(&topic, message).await;
                }
                debug!("Plugin {name} done consuming {topic}");
                name
            });
        }

        let state = if count == 0 {
            PluginState::Stopped
        } else {
            PluginState::Running(count)
        };
        self.states.insert(name.clone(), state);
        info!("Plugin {name} started with {count} subscriptions");
        Ok(())
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.states.get(name).copied()
    }

    /// Number of consumption loops still running.
    #[must_use]
    pub fn running_loops(&self) -> usize {
        self.loops.len()
    }

    /// Waits for every consumption loop to end, which happens once the broker is closed.
    pub async fn wait(&mut self) {
        while let Some(result) = self.loops.join_next().await {
            match result {
                Ok(name) => self.loop_finished(&name),
                Err(e) if e.is_panic() => error!("Plugin loop panicked: {e:?}"),
                Err(e) => debug!("Plugin loop cancelled: {e}"),
            }
        }
    }

    /// Like [`PluginHost::wait`], aborting the loops still running after `limit`.
    /// Returns whether every loop finished on its own.
    pub async fn wait_timeout(&mut self, limit: Duration) -> bool {
        self.wait_until(Instant::now() + limit).await
    }

    /// Like [`PluginHost::wait_timeout`] against an absolute deadline, so the
    /// plugins only get what is left of a grace period already in progress.
    pub async fn wait_until(&mut self, deadline: Instant) -> bool {
        if tokio::time::timeout_at(deadline, self.wait()).await.is_ok() {
            return true;
        }
        warn!(
            "{} plugin loops still running at the shutdown deadline, aborting them",
            self.loops.len()
        );
        self.loops.shutdown().await;
        for state in self.states.values_mut() {
            *state = PluginState::Stopped;
        }
        false
    }

    fn loop_finished(&mut self, name: &str) {
        if let Some(state) = self.states.get_mut(name) {
            *state = match *state {
                PluginState::Running(n) if n > 1 => PluginState::Running(n - 1),
                _ => {
                    info!("Plugin {name} stopped");
                    PluginState::Stopped
                }
            };
        }
    }
}
