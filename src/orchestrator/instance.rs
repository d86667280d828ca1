//! Orchestrates every component's lifecycle. See spec §4.12.
//!
//! Brings components up in dependency order (async executor -> http client
//! -> authorization proxy -> http server -> budget helper -> front-end) and
//! tears them down in exact reverse. `Init` may run once; `Run` only after a
//! successful `Init`; `Stop` is idempotent and safe to call from a signal
//! handler racing against a still-starting `Run`.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use async_trait::async_trait;
use hyper::Method;
use log::{error, info};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::authz::{AuthorizationProxy, PassThroughAuthorizationProxy};
use crate::budget::{BudgetConsumptionHelper, InMemoryBudgetConsumptionHelper};
use crate::config::Config;
use crate::executor::ExecutorPool;
use crate::frontend::{self, FrontEndState};
use crate::health::{HealthConfig, HealthService};
use crate::http::{Handler, HandlerRequest, HandlerResponse, HttpServer, HttpServerConfig, RouterBuilder};
use crate::metrics::MetricRouter;

/// Default token capacity for a freshly-seen `(key, time_bucket)` pair. The
/// spec names no configuration knob for this, so this implementation uses
/// `token`'s maximum representable value (spec §6, begin/prepare body: `token`
/// is `1..=255`) — recorded as an open-question resolution in `DESIGN.md`.
const DEFAULT_BUDGET_CAPACITY_PER_BUCKET: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

/// Adapts [`HealthService`] to the HTTP [`Handler`] boundary for the
/// standalone health port (spec §4.11).
struct HealthCheckHandler {
    service: Arc<HealthService>,
}

#[async_trait]
impl Handler for HealthCheckHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        match self.service.check() {
            Ok(()) => HandlerResponse::empty(200),
            Err(e) => {
                error!("health probe failed: {e}");
                HandlerResponse::empty(503)
            }
        }
    }
}

/// Top-level process instance: one set of wired components, started and
/// stopped together. `pbs_server` owns exactly one of these.
pub struct Instance {
    config: Config,
    state: Mutex<InstanceState>,
    executor: Arc<ExecutorPool>,
    metrics: Arc<MetricRouter>,
    authz_proxy: Arc<dyn AuthorizationProxy>,
    budget_helper: Arc<dyn BudgetConsumptionHelper>,
    front_end_server: Mutex<Option<Arc<HttpServer>>>,
    health_server: Mutex<Option<Arc<HttpServer>>>,
    front_end_task: Mutex<Option<JoinHandle<()>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    stop_notify: Arc<Notify>,
}

impl Instance {
    pub fn new(config: Config) -> Self {
        let executor = Arc::new(ExecutorPool::new(
            config.async_executor_threads_count,
            config.async_executor_queue_size,
            false,
        ));
        let metrics = Arc::new(MetricRouter::new(config.otel_enabled));
        // The live identity endpoint is a cloud-vendor collaborator (spec §1
        // Non-goals); this crate never implements a real `IdentityClient`,
        // so the pass-through proxy is wired unconditionally rather than
        // `CachingAuthorizationProxy` (DESIGN.md open question).
        let authz_proxy: Arc<dyn AuthorizationProxy> = Arc::new(PassThroughAuthorizationProxy);
        let budget_helper: Arc<dyn BudgetConsumptionHelper> = Arc::new(
            InMemoryBudgetConsumptionHelper::new(DEFAULT_BUDGET_CAPACITY_PER_BUCKET),
        );

        Self {
            config,
            state: Mutex::new(InstanceState::Uninitialized),
            executor,
            metrics,
            authz_proxy,
            budget_helper,
            front_end_server: Mutex::new(None),
            health_server: Mutex::new(None),
            front_end_task: Mutex::new(None),
            health_task: Mutex::new(None),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    /// Brings every component up in dependency order. May be called exactly
    /// once; a second call is a programming error, not a runtime condition,
    /// so it fails loudly via `anyhow`.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("instance state mutex poisoned");
        if *state != InstanceState::Uninitialized {
            bail!("Instance::init called more than once");
        }

        // 1. async executor
        self.executor.init();

        // 2. http client: no outbound HTTP client is constructed. The real
        //    identity-endpoint client this would back is out of scope (see
        //    `authz_proxy` above), so this step is a deliberate no-op.

        // 3. authorization proxy: constructed in `new`, stateless, nothing
        //    further to initialize.

        // 4/6. http server + front-end: the router must be fully assembled
        //    before an `HttpServer` can be constructed (this crate's router
        //    is immutable once frozen), so route registration happens here,
        //    ahead of `HttpServer::new`, while still completing before `Run`
        //    per spec §4.9's "Http server registration" invariant.
        let front_end_state = Arc::new(FrontEndState {
            budget_helper: self.budget_helper.clone(),
            authz_proxy: self.authz_proxy.clone(),
            metrics: self.metrics.clone(),
            remote_coordinator_claimed_identity: self.config.remote_claimed_identity.clone(),
        });
        let mut builder = RouterBuilder::new();
        frontend::register_routes(&mut builder, front_end_state);
        let router = builder.freeze();
        let front_end_server = Arc::new(HttpServer::new(
            HttpServerConfig {
                host: self.config.host_address.clone(),
                port: self.config.host_port,
                use_tls: self.config.use_tls,
                tls_certificate_file_path: self.config.tls_certificate_file_path.clone(),
                tls_private_key_file_path: self.config.tls_private_key_file_path.clone(),
            },
            router,
        ));
        *self
            .front_end_server
            .lock()
            .expect("instance front-end server mutex poisoned") = Some(front_end_server);

        if let Some(health_port) = self.config.health_port {
            let health_service = Arc::new(HealthService::new(HealthConfig::default()));
            let mut health_builder = RouterBuilder::new();
            health_builder.register(
                Method::GET,
                "/health/check",
                Arc::new(HealthCheckHandler {
                    service: health_service,
                }),
            );
            let health_router = health_builder.freeze();
            let health_server = Arc::new(HttpServer::new(
                HttpServerConfig {
                    host: self.config.host_address.clone(),
                    port: health_port,
                    use_tls: false,
                    tls_certificate_file_path: None,
                    tls_private_key_file_path: None,
                },
                health_router,
            ));
            *self
                .health_server
                .lock()
                .expect("instance health server mutex poisoned") = Some(health_server);
        }

        // 5. budget helper: constructed in `new`, nothing further to do.

        *state = InstanceState::Initialized;
        info!("pbs instance initialized");
        Ok(())
    }

    /// Runs until `Stop` is called (from a signal handler or another
    /// thread) or a server's accept loop fails. Returns `Ok(())` on a clean
    /// stop, `Err` if a server failed to bind or accept.
    pub async fn run(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().expect("instance state mutex poisoned");
            if *state != InstanceState::Initialized {
                bail!("Instance::run called before a successful Init");
            }
            *state = InstanceState::Running;
        }
        self.executor.run();

        let front_end_server = self
            .front_end_server
            .lock()
            .expect("instance front-end server mutex poisoned")
            .clone()
            .context("Instance::run called without a front-end server (Init did not run)")?;
        let front_end_failure = Arc::new(Notify::new());
        let front_end_task = {
            let server = front_end_server.clone();
            let failure = front_end_failure.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("front-end http server exited: {e}");
                    failure.notify_one();
                }
            })
        };
        *self
            .front_end_task
            .lock()
            .expect("instance front-end task mutex poisoned") = Some(front_end_task);

        let health_server = self
            .health_server
            .lock()
            .expect("instance health server mutex poisoned")
            .clone();
        let health_failure = Arc::new(Notify::new());
        if let Some(server) = health_server {
            let failure = health_failure.clone();
            let health_task = tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("health http server exited: {e}");
                    failure.notify_one();
                }
            });
            *self
                .health_task
                .lock()
                .expect("instance health task mutex poisoned") = Some(health_task);
        }

        info!("pbs instance running");
        tokio::select! {
            _ = self.stop_notify.notified() => {
                self.stop();
                Ok(())
            }
            _ = front_end_failure.notified() => {
                self.stop();
                bail!("front-end http server failed; see logs for the bind/accept error")
            }
            _ = health_failure.notified() => {
                self.stop();
                bail!("health http server failed; see logs for the bind/accept error")
            }
        }
    }

    /// Requests shutdown. Safe to call before `Run` returns, from any
    /// thread, any number of times (spec §4.12: "`Stop` is idempotent").
    /// Tears components down in exact reverse dependency order.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("instance state mutex poisoned");
        if *state == InstanceState::Stopped {
            return;
        }
        self.stop_notify.notify_one();

        // 6/4. front-end + http server: abort the accept-loop tasks.
        if let Some(task) = self
            .front_end_task
            .lock()
            .expect("instance front-end task mutex poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(task) = self
            .health_task
            .lock()
            .expect("instance health task mutex poisoned")
            .take()
        {
            task.abort();
        }

        // 5. budget helper, 3. authorization proxy, 2. http client: no
        // owned resources (sockets, threads) to release.

        // 1. async executor: joins its worker thread.
        self.executor.stop();

        *state = InstanceState::Stopped;
        info!("pbs instance stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host_address: "127.0.0.1".to_string(),
            host_port: 0,
            health_port: None,
            use_tls: false,
            tls_private_key_file_path: None,
            tls_certificate_file_path: None,
            async_executor_threads_count: 2,
            async_executor_queue_size: 16,
            remote_claimed_identity: None,
            container_type: crate::config::ContainerType::Other,
            otel_enabled: true,
        }
    }

    #[test]
    fn init_is_rejected_a_second_time() {
        let instance = Instance::new(test_config());
        instance.init().unwrap();
        assert!(instance.init().is_err());
    }

    #[tokio::test]
    async fn run_before_init_fails_without_panicking() {
        let instance = Instance::new(test_config());
        assert!(instance.run().await.is_err());
    }

    #[test]
    fn stop_before_run_is_a_harmless_no_op() {
        let instance = Instance::new(test_config());
        instance.init().unwrap();
        instance.stop();
        instance.stop();
    }

    #[tokio::test]
    async fn run_returns_cleanly_when_stopped_concurrently() {
        let instance = Arc::new(Instance::new(test_config()));
        instance.init().unwrap();
        let runner = instance.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        instance.stop();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
