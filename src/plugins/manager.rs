use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::PluginError;

use super::{EventBus, Plugin, PluginConfig, PluginEvent, PluginStatus, PluginType};

pub type PluginFactory = Arc<dyn Fn(PluginConfig) -> Box<dyn Plugin> + Send + Sync>;

struct ClassRegistration {
    name: String,
    plugin_type: PluginType,
    dependencies: Vec<String>,
    factory: PluginFactory,
}

struct PluginHandle {
    instance: Box<dyn Plugin>,
    config: PluginConfig,
    status: PluginStatus,
    dependencies: Vec<String>,
    consecutive_health_failures: u32,
}

/// Outcome of a bulk initialize. Individual failures are recorded on the
/// affected module, not raised; the batch reports aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub total_enabled: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped_disabled: usize,
}

impl InitReport {
    pub fn all_succeeded(&self) -> bool {
        self.successes == self.total_enabled
    }
}

/// Generic registry for capability modules: data providers, analyzers,
/// trading strategies. Tracks registration, builds the dependency graph, and
/// drives initialize/cleanup in dependency order.
pub struct PluginManager {
    classes: RwLock<HashMap<String, ClassRegistration>>,
    plugins: RwLock<HashMap<String, PluginHandle>>,
    init_order: RwLock<Vec<String>>,
    // Serializes bulk registry mutations, not a module's own internal I/O.
    bulk_lock: Mutex<()>,
    events: EventBus,
}

impl PluginManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            plugins: RwLock::new(HashMap::new()),
            init_order: RwLock::new(Vec::new()),
            bulk_lock: Mutex::new(()),
            events,
        }
    }

    /// Record a factory for later instantiation. Static metadata (name,
    /// type, declared dependencies) is read off a throwaway instance.
    pub async fn register_class(&self, factory: PluginFactory) -> String {
        let probe = factory(PluginConfig::default());
        let registration = ClassRegistration {
            name: probe.name().to_string(),
            plugin_type: probe.plugin_type(),
            dependencies: probe.dependencies(),
            factory,
        };
        let name = registration.name.clone();
        drop(probe);

        self.classes
            .write()
            .await
            .insert(name.clone(), registration);
        self.events
            .publish(PluginEvent::Registered { name: name.clone() });
        info!("📦 Registered plugin class '{}'", name);
        name
    }

    /// Instantiate a registered class. Fails if the name is unknown or an
    /// instance already exists.
    pub async fn create(&self, name: &str, config: PluginConfig) -> Result<(), PluginError> {
        let _guard = self.bulk_lock.lock().await;

        if self.plugins.read().await.contains_key(name) {
            return Err(PluginError::AlreadyExists(name.to_string()));
        }

        let classes = self.classes.read().await;
        let registration = classes
            .get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;

        let handle = PluginHandle {
            instance: (registration.factory)(config.clone()),
            config,
            status: PluginStatus::Uninitialized,
            dependencies: registration.dependencies.clone(),
            consecutive_health_failures: 0,
        };
        drop(classes);

        self.plugins.write().await.insert(name.to_string(), handle);
        self.events
            .publish(PluginEvent::Created { name: name.to_string() });
        Ok(())
    }

    /// Kahn's topological sort over the declared dependency edges. Returns
    /// the initialization order, or the names stuck in a cycle.
    async fn topological_order(&self) -> Result<Vec<String>, PluginError> {
        let plugins = self.plugins.read().await;

        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for (name, handle) in plugins.iter() {
            let degree = handle
                .dependencies
                .iter()
                .filter(|dep| plugins.contains_key(*dep))
                .count();
            in_degree.insert(name.clone(), degree);
            for dep in &handle.dependencies {
                if plugins.contains_key(dep) {
                    dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(name.clone());
                }
            }
        }

        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.clone())
            .collect();
        let mut order = Vec::with_capacity(plugins.len());

        while let Some(name) = queue.pop_front() {
            order.push(name.clone());
            if let Some(children) = dependents.get(&name) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.clone());
                        }
                    }
                }
            }
        }

        if order.len() < plugins.len() {
            let mut stuck: Vec<String> = plugins
                .keys()
                .filter(|n| !order.contains(n))
                .cloned()
                .collect();
            stuck.sort();
            return Err(PluginError::DependencyCycle(stuck));
        }

        Ok(order)
    }

    /// Initialize every instantiated plugin in dependency order. A cycle is
    /// fatal to the whole batch; an individual module failure is isolated
    /// and recorded as status=error.
    pub async fn initialize_all(&self) -> Result<InitReport, PluginError> {
        let _guard = self.bulk_lock.lock().await;

        let order = self.topological_order().await?;
        info!("🔌 Initializing {} plugins in dependency order", order.len());

        let mut report = InitReport {
            total_enabled: 0,
            successes: 0,
            failures: 0,
            skipped_disabled: 0,
        };
        let mut completed = Vec::with_capacity(order.len());

        for name in &order {
            let mut plugins = self.plugins.write().await;
            let handle = match plugins.get_mut(name) {
                Some(h) => h,
                None => continue,
            };

            if !handle.config.enabled {
                report.skipped_disabled += 1;
                continue;
            }
            report.total_enabled += 1;

            handle.status = PluginStatus::Initializing;
            match handle.instance.initialize().await {
                Ok(()) => {
                    handle.status = PluginStatus::Active;
                    report.successes += 1;
                    completed.push(name.clone());
                    drop(plugins);
                    self.events
                        .publish(PluginEvent::Initialized { name: name.clone() });
                    info!("✅ Plugin '{}' active", name);
                }
                Err(e) => {
                    handle.status = PluginStatus::Error;
                    report.failures += 1;
                    drop(plugins);
                    self.events.publish(PluginEvent::InitializationFailed {
                        name: name.clone(),
                        reason: e.to_string(),
                    });
                    error!("Plugin '{}' failed to initialize: {}", name, e);
                }
            }
        }

        *self.init_order.write().await = completed;

        if !report.all_succeeded() {
            warn!(
                "Plugin batch finished with {}/{} initialized",
                report.successes, report.total_enabled
            );
        }
        Ok(report)
    }

    /// Tear down active plugins in reverse initialization order.
    pub async fn cleanup_all(&self) -> usize {
        let _guard = self.bulk_lock.lock().await;

        let order = self.init_order.read().await.clone();
        let mut cleaned = 0;

        for name in order.iter().rev() {
            let mut plugins = self.plugins.write().await;
            let handle = match plugins.get_mut(name) {
                Some(h) if h.status == PluginStatus::Active => h,
                _ => continue,
            };

            match handle.instance.cleanup().await {
                Ok(()) => {
                    handle.status = PluginStatus::Disabled;
                    cleaned += 1;
                    drop(plugins);
                    self.events
                        .publish(PluginEvent::CleanedUp { name: name.clone() });
                }
                Err(e) => {
                    handle.status = PluginStatus::Error;
                    drop(plugins);
                    let err = PluginError::CleanupFailed {
                        name: name.clone(),
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                }
            }
        }

        self.init_order.write().await.clear();
        cleaned
    }

    /// Probe every active plugin, tracking consecutive failures per module
    /// and resetting the counter on success.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        let mut plugins = self.plugins.write().await;

        for (name, handle) in plugins.iter_mut() {
            if handle.status != PluginStatus::Active {
                continue;
            }
            let healthy = handle.instance.health_check().await;
            if healthy {
                handle.consecutive_health_failures = 0;
            } else {
                handle.consecutive_health_failures += 1;
                self.events.publish(PluginEvent::HealthCheckFailed {
                    name: name.clone(),
                    consecutive_failures: handle.consecutive_health_failures,
                });
                warn!(
                    "Plugin '{}' failed health check ({} consecutive)",
                    name, handle.consecutive_health_failures
                );
            }
            results.insert(name.clone(), healthy);
        }

        results
    }

    pub async fn status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.read().await.get(name).map(|h| h.status)
    }

    pub async fn active_count(&self) -> usize {
        self.plugins
            .read()
            .await
            .values()
            .filter(|h| h.status == PluginStatus::Active)
            .count()
    }
}
